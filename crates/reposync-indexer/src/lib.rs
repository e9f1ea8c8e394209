//! RepoSync Indexer
//!
//! This crate provides the indexing engine for RepoSync, including:
//! - Repository walking with gitignore-style exclusion rules
//! - Structural segmentation via tree-sitter for multiple languages
//! - Token-bounded splitting of source text into retrievable chunks
//! - Vector-store collaborators (in-memory and on-disk) with batched upsert
//! - Commit-keyed incremental synchronization against git history

mod error;
pub mod chunking;
pub mod scanner;
pub mod storage;
pub mod sync;
pub mod vcs;

pub use chunking::{
    split, Chunk, Chunker, DeclarationKind, Grammar, Language, TiktokenCounter, TokenCounter,
};
pub use error::IndexerError;
pub use scanner::{IgnoreFilter, Walker};
pub use storage::{
    add_batch, create_embedder, BatchBuffer, Embedder, HashingEmbedder, LocalStore, MemoryStore,
    Metadata, MetadataValue, QueryHit, Record, VectorStore, Where,
};
pub use sync::{CommitLog, SyncEngine, SyncOptions, SyncOutcome, SyncReport, SyncState};
pub use vcs::{parse_name_status, GitCli, Vcs};
