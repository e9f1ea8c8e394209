//! The sync state machine.

use super::{CommitLog, SyncOptions, SyncOutcome, SyncReport, SyncState};
use crate::chunking::{Chunk, Chunker, Language};
use crate::scanner::{IgnoreFilter, Walker};
use crate::storage::{BatchBuffer, VectorStore, Where};
use crate::vcs::Vcs;
use crate::IndexerError;
use reposync_core::{Commit, CommitPointer, Diff};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keeps a commit-keyed vector index in step with a repository.
pub struct SyncEngine {
    root: PathBuf,
    vcs: Arc<dyn Vcs>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    filter: Arc<IgnoreFilter>,
    log: CommitLog,
    options: SyncOptions,
}

impl SyncEngine {
    /// Create an engine for the repository at `root`, loading its ignore
    /// rules.
    pub fn new(
        root: &Path,
        vcs: Arc<dyn Vcs>,
        store: Arc<dyn VectorStore>,
        chunker: Chunker,
        options: SyncOptions,
    ) -> Result<Self, IndexerError> {
        if !root.is_dir() {
            return Err(IndexerError::NotFound(root.to_path_buf()));
        }
        let filter = Arc::new(IgnoreFilter::new(root)?);
        let log = CommitLog::new(Arc::clone(&store), options.meta_collection.clone());
        Ok(Self {
            root: root.to_path_buf(),
            vcs,
            store,
            chunker,
            filter,
            log,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn commit_log(&self) -> &CommitLog {
        &self.log
    }

    /// Current commit id and message.
    pub async fn resolve_head(&self) -> Result<Commit, IndexerError> {
        self.vcs.head().await
    }

    /// Read the latest-commit pointer.
    pub async fn state(&self) -> Result<SyncState, IndexerError> {
        Ok(match self.log.latest().await? {
            Some(pointer) => SyncState::Synced(pointer),
            None => SyncState::Uninitialized,
        })
    }

    /// Bring the index up to HEAD.
    ///
    /// A failure leaves the pointer where it was; calling `sync` again
    /// redoes the same transition.
    pub async fn sync(&self) -> Result<SyncReport, IndexerError> {
        let head = self.resolve_head().await?;
        info!(root = ?self.root, commit = %head.id, "Starting sync");

        let outcome = match self.state().await? {
            SyncState::Uninitialized => {
                let outcome = self.index_all(&head).await?;
                self.log.record_initial(&head).await?;
                outcome
            }
            SyncState::Synced(latest) if latest.commit_id == head.id => {
                info!(commit = %head.id, "Index already up to date");
                SyncOutcome::UpToDate
            }
            SyncState::Synced(latest) if self.is_finished(&head.id).await? => {
                info!(
                    from = %latest.commit_id,
                    to = %head.id,
                    "Reusing finished collection of a previously indexed commit"
                );
                self.log.advance(&latest, &head).await?;
                SyncOutcome::Restored
            }
            SyncState::Synced(latest) => {
                let diff = self.vcs.diff(&latest.commit_id, &head.id).await?;
                let outcome = self.index_diff(&latest, &head, &diff).await?;
                self.log.advance(&latest, &head).await?;
                outcome
            }
        };

        Ok(SyncReport {
            commit: head.id.clone(),
            collection: head.id,
            outcome,
        })
    }

    /// A commit is finished when a pointer names it and its collection is
    /// still present.
    async fn is_finished(&self, commit_id: &str) -> Result<bool, IndexerError> {
        Ok(self.log.find(commit_id).await?.is_some()
            && self.store.has_collection(commit_id).await?)
    }

    async fn index_all(&self, head: &Commit) -> Result<SyncOutcome, IndexerError> {
        let collection = head.id.as_str();
        // No pointer names this commit, so an existing collection was left by
        // a failed attempt.
        if self.store.has_collection(collection).await? {
            warn!(collection = %collection, "Resuming full index into existing collection");
        }
        self.store.get_or_create_collection(collection).await?;

        let root = self.root.clone();
        let filter = Arc::clone(&self.filter);
        let entries = tokio::task::spawn_blocking(move || Walker::new(&root, filter).walk())
            .await
            .map_err(|e| IndexerError::Io(std::io::Error::other(e.to_string())))?;

        let mut buffer = BatchBuffer::new(self.store.as_ref(), collection, self.options.batch_size)?;
        let mut files = 0;

        for entry in entries {
            if entry.size > self.options.max_file_size {
                debug!(path = %entry.rel_path, size = entry.size, "Skipping large file");
                continue;
            }
            if let Some(chunks) = self.chunk_file(collection, &entry.rel_path, &entry.path).await? {
                files += 1;
                buffer.push_file(chunks).await?;
            }
        }

        let stats = buffer.finish().await?;
        self.store.flush(collection).await?;
        info!(
            commit = %head.id,
            files,
            chunks = stats.upserted,
            batches = stats.batches,
            "Full index complete"
        );

        Ok(SyncOutcome::FullIndex {
            files,
            chunks: stats.upserted,
        })
    }

    async fn index_diff(
        &self,
        latest: &CommitPointer,
        head: &Commit,
        diff: &Diff,
    ) -> Result<SyncOutcome, IndexerError> {
        let collection = head.id.as_str();
        if self.store.has_collection(collection).await? {
            warn!(collection = %collection, "Resuming delta index into existing collection");
        } else {
            self.store.fork(&latest.commit_id, collection).await?;
        }

        let touched = diff.touched();
        let chunks_removed = if touched.is_empty() {
            0
        } else {
            self.store
                .delete(collection, &Where::is_in("filePath", touched))
                .await?
        };

        let mut buffer = BatchBuffer::new(self.store.as_ref(), collection, self.options.batch_size)?;

        for rel_path in diff.reindexed() {
            if self.filter.is_ignored(Path::new(&rel_path), false) {
                debug!(path = %rel_path, "Skipping ignored path");
                continue;
            }
            let path = self.root.join(&rel_path);
            match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) if !meta.is_file() => {
                    debug!(path = %rel_path, "Skipping non-regular file");
                    continue;
                }
                Ok(meta) if meta.len() > self.options.max_file_size => {
                    debug!(path = %rel_path, size = meta.len(), "Skipping large file");
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    warn!(path = %rel_path, "Changed path missing from working tree, skipping");
                    continue;
                }
            }
            if let Some(chunks) = self.chunk_file(collection, &rel_path, &path).await? {
                buffer.push_file(chunks).await?;
            }
        }

        let stats = buffer.finish().await?;
        self.store.flush(collection).await?;
        info!(
            from = %latest.commit_id,
            to = %head.id,
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            chunks_removed,
            chunks_added = stats.upserted,
            "Delta index complete"
        );

        Ok(SyncOutcome::DeltaIndex {
            added: diff.added.len(),
            modified: diff.modified.len(),
            deleted: diff.deleted.len(),
            chunks_removed,
            chunks_added: stats.upserted,
        })
    }

    /// Read and chunk one file. `None` means the file is skipped: its
    /// language is unsupported, it cannot be read as UTF-8, or it failed to
    /// parse while `skip_unparseable` is set.
    async fn chunk_file(
        &self,
        commit_id: &str,
        rel_path: &str,
        path: &Path,
    ) -> Result<Option<Vec<Chunk>>, IndexerError> {
        if Language::from_path(path).is_none() {
            return Ok(None);
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %rel_path, error = %e, "Skipping unreadable file");
                return Ok(None);
            }
        };

        match self.chunker.chunk_for_commit(commit_id, rel_path, &content) {
            Ok(chunks) => Ok(Some(chunks)),
            Err(e @ IndexerError::Parse { .. }) if self.options.skip_unparseable => {
                warn!(path = %rel_path, error = %e, "Skipping unparseable file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("root", &self.root)
            .field("chunker", &self.chunker)
            .field("log", &self.log)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
