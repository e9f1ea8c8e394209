//! Commit pointer records kept in the meta-collection.

use crate::storage::{Metadata, MetadataValue, Record, VectorStore, Where};
use crate::IndexerError;
use chrono::{DateTime, Utc};
use reposync_core::{Commit, CommitPointer};
use std::sync::Arc;
use tracing::{info, warn};

const IS_LATEST: &str = "isLatest";
const INDEXED_AT: &str = "indexedAt";

/// Reads and advances the "latest indexed commit" pointer.
///
/// Each indexed commit has one record: id = commit id, document = commit
/// message, metadata `{isLatest, indexedAt}`.
#[derive(Clone)]
pub struct CommitLog {
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl CommitLog {
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The pointer flagged latest, if any commit has been indexed.
    pub async fn latest(&self) -> Result<Option<CommitPointer>, IndexerError> {
        if !self.store.has_collection(&self.collection).await? {
            return Ok(None);
        }
        let records = self
            .store
            .get(&self.collection, Some(&Where::eq(IS_LATEST, true)))
            .await?;

        let mut pointers: Vec<CommitPointer> = records.iter().map(pointer_from_record).collect();
        if pointers.len() > 1 {
            warn!(
                collection = %self.collection,
                count = pointers.len(),
                "Multiple latest pointers, using the most recently indexed"
            );
        }
        sort_newest_first(&mut pointers);
        Ok(pointers.into_iter().next())
    }

    /// Every indexed commit, newest first.
    pub async fn history(&self) -> Result<Vec<CommitPointer>, IndexerError> {
        if !self.store.has_collection(&self.collection).await? {
            return Ok(Vec::new());
        }
        let records = self.store.get(&self.collection, None).await?;
        let mut pointers: Vec<CommitPointer> = records.iter().map(pointer_from_record).collect();
        sort_newest_first(&mut pointers);
        Ok(pointers)
    }

    /// The pointer record of `commit_id`, if that commit was ever indexed.
    pub async fn find(&self, commit_id: &str) -> Result<Option<CommitPointer>, IndexerError> {
        Ok(self
            .history()
            .await?
            .into_iter()
            .find(|p| p.commit_id == commit_id))
    }

    /// Insert the first pointer, creating the meta-collection.
    pub async fn record_initial(&self, head: &Commit) -> Result<CommitPointer, IndexerError> {
        let pointer = CommitPointer::latest(head);
        self.store.get_or_create_collection(&self.collection).await?;
        self.store
            .add(&self.collection, vec![pointer_record(&pointer)])
            .await?;
        self.store.flush(&self.collection).await?;
        info!(commit = %head.id, "Recorded initial commit pointer");
        Ok(pointer)
    }

    /// Move the latest flag from `previous` to `head` in one upsert.
    pub async fn advance(
        &self,
        previous: &CommitPointer,
        head: &Commit,
    ) -> Result<CommitPointer, IndexerError> {
        let pointer = CommitPointer::latest(head);
        let records = vec![
            pointer_record(&previous.superseded()),
            pointer_record(&pointer),
        ];
        self.store.add(&self.collection, records).await?;
        self.store.flush(&self.collection).await?;
        info!(from = %previous.commit_id, to = %head.id, "Advanced commit pointer");
        Ok(pointer)
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn pointer_record(pointer: &CommitPointer) -> Record {
    let mut metadata = Metadata::new();
    metadata.insert(IS_LATEST.to_string(), pointer.is_latest.into());
    if let Some(at) = pointer.indexed_at {
        metadata.insert(INDEXED_AT.to_string(), at.to_rfc3339().into());
    }
    Record {
        id: pointer.commit_id.clone(),
        document: pointer.message.clone(),
        metadata,
    }
}

fn pointer_from_record(record: &Record) -> CommitPointer {
    let indexed_at = record
        .metadata
        .get(INDEXED_AT)
        .and_then(MetadataValue::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    CommitPointer {
        commit_id: record.id.clone(),
        message: record.document.clone(),
        is_latest: record
            .metadata
            .get(IS_LATEST)
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false),
        indexed_at,
    }
}

fn sort_newest_first(pointers: &mut [CommitPointer]) {
    pointers.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
}
