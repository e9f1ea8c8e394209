//! Repository walker driven by an [`IgnoreFilter`].

use super::IgnoreFilter;
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use tracing::debug;

/// A discovered file entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated
    pub rel_path: String,
    /// File size in bytes
    pub size: u64,
}

/// Walks every non-ignored file under a repository root.
///
/// Only the [`IgnoreFilter`] decides exclusion; the walker's own hidden-file
/// and gitignore handling are turned off so full and delta syncs agree on
/// which paths are indexable. Symbolic links are never followed and only
/// regular files are reported.
pub struct Walker {
    root: PathBuf,
    filter: Arc<IgnoreFilter>,
}

impl Walker {
    /// Create a new walker for the given root directory.
    pub fn new(root: &Path, filter: Arc<IgnoreFilter>) -> Self {
        Self {
            root: root.to_path_buf(),
            filter,
        }
    }

    /// Walk the directory tree and return all discovered files, sorted by
    /// relative path.
    ///
    /// Unreadable entries are skipped: an unreadable directory behaves as if
    /// it were empty.
    pub fn walk(&self) -> Vec<FileEntry> {
        let (tx, rx) = mpsc::channel();

        let root = self.root.clone();
        let filter = Arc::clone(&self.filter);

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    return false;
                };
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                !filter.is_ignored(rel, is_dir)
            })
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            let root = self.root.clone();
            Box::new(move |result| {
                let entry = match result {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!(error = %e, "Skipping unreadable entry");
                        return WalkState::Continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    return WalkState::Continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    let _ = tx.send(FileEntry {
                        path: entry.path().to_path_buf(),
                        rel_path: to_slash(rel),
                        size,
                    });
                }
                WalkState::Continue
            })
        });
        drop(tx);

        // Parallel walk order is arbitrary.
        let mut entries: Vec<FileEntry> = rx.into_iter().collect();
        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        entries
    }
}

/// Render a relative path with `/` separators, matching git's path output.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
