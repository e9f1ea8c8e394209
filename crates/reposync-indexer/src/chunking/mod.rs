//! Chunking: structural segmentation plus token-bounded splitting.
//!
//! A supported source file is parsed with tree-sitter, cut into declaration
//! and gap regions, and each region is packed into chunks that fit the token
//! budget. The chunks for one file always partition its lines.

mod language;
mod segmenter;
mod splitter;
mod tokens;

pub use language::{DeclarationKind, Grammar, Language};
pub use segmenter::{segment, source_lines, Region};
pub use splitter::split;
pub use tokens::{FnCounter, TiktokenCounter, TokenCounter};

use crate::IndexerError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A retrievable unit of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document: String,
    /// First line, 0-indexed
    pub start_line: usize,
    /// Last line, inclusive
    pub end_line: usize,
    /// Enclosing declaration name; `None` for gap text
    pub symbol: Option<String>,
    pub file_path: Option<String>,
    pub language: Option<String>,
}

impl Chunk {
    /// An untagged chunk with a fresh random id.
    pub fn new(document: String, start_line: usize, end_line: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document,
            start_line,
            end_line,
            symbol: None,
            file_path: None,
            language: None,
        }
    }
}

/// Deterministic chunk id for the `ordinal`-th chunk of `file_path` indexed
/// at `commit_id`. Re-running the same index step yields the same ids.
pub fn stable_chunk_id(commit_id: &str, file_path: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(commit_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(file_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(ordinal.to_le_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// Turns source files into chunks under a fixed token budget.
#[derive(Clone)]
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    token_budget: usize,
}

impl Chunker {
    pub fn new(counter: Arc<dyn TokenCounter>, token_budget: usize) -> Self {
        Self {
            counter,
            token_budget,
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Chunk `content` of the file at `rel_path`.
    ///
    /// Unsupported extensions yield an empty list. Every chunk is tagged with
    /// the file path and language; declaration chunks also carry the symbol.
    pub fn chunk_source(&self, rel_path: &str, content: &str) -> Result<Vec<Chunk>, IndexerError> {
        let Some(language) = Language::from_path(Path::new(rel_path)) else {
            return Ok(Vec::new());
        };
        let grammar = language.grammar();

        let regions = segment(content, &grammar).map_err(|message| IndexerError::Parse {
            path: PathBuf::from(rel_path),
            message,
        })?;

        let mut chunks = Vec::new();
        for region in regions {
            let pieces = split(
                &region.text,
                region.start_line,
                self.token_budget,
                self.counter.as_ref(),
            );
            chunks.extend(pieces.into_iter().map(|mut chunk| {
                chunk.symbol = region.symbol.clone();
                chunk.file_path = Some(rel_path.to_string());
                chunk.language = Some(grammar.name().to_string());
                chunk
            }));
        }

        debug!(path = %rel_path, chunks = chunks.len(), "Chunked file");

        Ok(chunks)
    }

    /// Like [`chunk_source`](Self::chunk_source), then replaces every chunk
    /// id with [`stable_chunk_id`] for `commit_id`.
    pub fn chunk_for_commit(
        &self,
        commit_id: &str,
        rel_path: &str,
        content: &str,
    ) -> Result<Vec<Chunk>, IndexerError> {
        let mut chunks = self.chunk_source(rel_path, content)?;
        for (ordinal, chunk) in chunks.iter_mut().enumerate() {
            chunk.id = stable_chunk_id(commit_id, rel_path, ordinal);
        }
        Ok(chunks)
    }
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("token_budget", &self.token_budget)
            .finish_non_exhaustive()
    }
}
