//! Batched upsert of chunks into a collection.

use super::{Metadata, MetadataValue, Record, VectorStore};
use crate::chunking::Chunk;
use crate::IndexerError;
use reposync_core::CoreError;
use tracing::debug;

/// Store record for a chunk: id and document, the rest as metadata.
pub fn chunk_record(chunk: &Chunk) -> Record {
    let mut metadata = Metadata::new();
    metadata.insert("startLine".to_string(), chunk.start_line.into());
    metadata.insert("endLine".to_string(), chunk.end_line.into());
    metadata.insert(
        "symbol".to_string(),
        chunk.symbol.clone().unwrap_or_default().into(),
    );
    metadata.insert(
        "filePath".to_string(),
        chunk.file_path.clone().unwrap_or_default().into(),
    );
    metadata.insert(
        "language".to_string(),
        chunk.language.clone().unwrap_or_default().into(),
    );
    Record {
        id: chunk.id.clone(),
        document: chunk.document.clone(),
        metadata,
    }
}

/// Rebuild a chunk from a stored record. Empty strings read back as `None`.
pub fn chunk_from_record(record: &Record) -> Chunk {
    let int = |key: &str| {
        record
            .metadata
            .get(key)
            .and_then(MetadataValue::as_int)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(0)
    };
    let text = |key: &str| {
        record
            .metadata
            .get(key)
            .and_then(MetadataValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Chunk {
        id: record.id.clone(),
        document: record.document.clone(),
        start_line: int("startLine"),
        end_line: int("endLine"),
        symbol: text("symbol"),
        file_path: text("filePath"),
        language: text("language"),
    }
}

/// Upsert the first `batch_size` chunks of `pending` in one call and return
/// the rest, in order.
pub async fn add_batch(
    mut pending: Vec<Chunk>,
    store: &dyn VectorStore,
    collection: &str,
    batch_size: usize,
) -> Result<Vec<Chunk>, IndexerError> {
    let rest = pending.split_off(batch_size.min(pending.len()));
    if pending.is_empty() {
        return Ok(rest);
    }

    let records: Vec<Record> = pending.iter().map(chunk_record).collect();
    store.add(collection, records).await?;

    debug!(collection = %collection, batch = pending.len(), remaining = rest.len(), "Upserted batch");

    Ok(rest)
}

/// Counters reported by [`BatchBuffer::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub upserted: usize,
    pub batches: usize,
}

/// Pending-chunk buffer feeding one collection.
///
/// Push each file's chunks with [`push_file`](Self::push_file); call
/// [`finish`](Self::finish) after the last file to drain the buffer.
pub struct BatchBuffer<'a> {
    store: &'a dyn VectorStore,
    collection: String,
    batch_size: usize,
    pending: Vec<Chunk>,
    stats: BatchStats,
}

impl<'a> BatchBuffer<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        collection: &str,
        batch_size: usize,
    ) -> Result<Self, IndexerError> {
        if batch_size == 0 {
            return Err(CoreError::InvalidConfig("batch_size must be greater than 0".into()).into());
        }
        Ok(Self {
            store,
            collection: collection.to_string(),
            batch_size,
            pending: Vec::new(),
            stats: BatchStats::default(),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffer one file's chunks, flushing a single batch if the buffer now
    /// holds more than `batch_size`.
    pub async fn push_file(&mut self, chunks: Vec<Chunk>) -> Result<(), IndexerError> {
        self.pending.extend(chunks);
        if self.pending.len() > self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flush until the buffer is empty.
    pub async fn finish(mut self) -> Result<BatchStats, IndexerError> {
        while !self.pending.is_empty() {
            self.flush().await?;
        }
        Ok(self.stats)
    }

    async fn flush(&mut self) -> Result<(), IndexerError> {
        let pending = std::mem::take(&mut self.pending);
        let before = pending.len();
        self.pending = add_batch(pending, self.store, &self.collection, self.batch_size).await?;
        self.stats.upserted += before - self.pending.len();
        self.stats.batches += 1;
        Ok(())
    }
}
