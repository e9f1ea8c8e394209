//! Commit-keyed incremental synchronization.
//!
//! Every indexed commit owns one collection named by its id. The first sync
//! indexes the whole working tree; later syncs fork the latest collection
//! and re-index only the paths the commit diff touched. The commit pointer
//! is advanced last, so an interrupted sync is simply retried.
//!
//! A collection that has a pointer record is finished and is never written
//! again. When HEAD returns to such a commit the pointer moves back to it
//! and the store is left alone.

mod engine;
mod pointer;

pub use engine::SyncEngine;
pub use pointer::CommitLog;

use reposync_core::{CommitPointer, SyncConfig};

/// Where the repository stands relative to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No commit has been indexed yet
    Uninitialized,
    /// The pointer names the latest indexed commit
    Synced(CommitPointer),
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum documents per upsert call
    pub batch_size: usize,
    /// Collection holding commit pointer records
    pub meta_collection: String,
    /// Files larger than this are skipped (bytes)
    pub max_file_size: u64,
    /// Skip files that fail to parse instead of failing the sync
    pub skip_unparseable: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            meta_collection: "commits".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            skip_unparseable: false,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            meta_collection: config.meta_collection.clone(),
            skip_unparseable: config.skip_unparseable,
            ..Default::default()
        }
    }
}

/// What a sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Indexed the whole working tree
    FullIndex { files: usize, chunks: usize },
    /// Patched a fork of the previous commit's collection
    DeltaIndex {
        added: usize,
        modified: usize,
        deleted: usize,
        chunks_removed: usize,
        chunks_added: usize,
    },
    /// HEAD was already indexed
    UpToDate,
    /// HEAD names a commit indexed earlier; only the pointer moved
    Restored,
}

/// Result of [`SyncEngine::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// The commit now marked latest
    pub commit: String,
    /// Collection holding that commit's chunks
    pub collection: String,
    pub outcome: SyncOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = SyncConfig::new(512);
        config.batch_size = 7;
        config.meta_collection = "pointers".to_string();
        config.skip_unparseable = true;

        let options = SyncOptions::from(&config);
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.meta_collection, "pointers");
        assert!(options.skip_unparseable);
        assert_eq!(options.max_file_size, 10 * 1024 * 1024);
    }
}
