//! Path exclusion rules: the VCS metadata directory plus `.gitignore`.

use crate::IndexerError;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use reposync_core::CoreError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Rule always applied, whether or not the repository has a `.gitignore`.
const VCS_METADATA_RULE: &str = ".git";

/// Decides whether a repository-relative path is excluded from indexing.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: PathBuf,
    rules: Gitignore,
}

impl IgnoreFilter {
    /// Build the filter for a repository root, reading `<root>/.gitignore`
    /// when present.
    pub fn new(root: &Path) -> Result<Self, IndexerError> {
        let mut builder = GitignoreBuilder::new(root);
        add_rule(&mut builder, VCS_METADATA_RULE)?;

        let gitignore = root.join(".gitignore");
        if gitignore.is_file() {
            // Malformed lines are reported but the valid ones still apply.
            if let Some(e) = builder.add(&gitignore) {
                warn!(path = ?gitignore, error = %e, "Partially invalid .gitignore");
            }
            debug!(path = ?gitignore, "Loaded ignore rules");
        }

        Self::build(root, builder)
    }

    /// Build a filter from explicit gitignore-syntax lines (plus the VCS rule).
    pub fn from_rules(root: &Path, lines: &[&str]) -> Result<Self, IndexerError> {
        let mut builder = GitignoreBuilder::new(root);
        add_rule(&mut builder, VCS_METADATA_RULE)?;
        for line in lines {
            add_rule(&mut builder, line)?;
        }
        Self::build(root, builder)
    }

    fn build(root: &Path, builder: GitignoreBuilder) -> Result<Self, IndexerError> {
        let rules = builder
            .build()
            .map_err(|e| invalid_rules(format!("Invalid ignore rules: {}", e)))?;
        Ok(Self {
            root: root.to_path_buf(),
            rules,
        })
    }

    /// Whether `rel_path` is ignored, looking at the filesystem to decide if
    /// it names a directory.
    pub fn ignores(&self, rel_path: &Path) -> bool {
        let is_dir = self.root.join(rel_path).is_dir();
        self.is_ignored(rel_path, is_dir)
    }

    /// Whether `rel_path` is ignored, with the directory flag supplied by the
    /// caller. A path is ignored if it or any of its parents match.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        if rel_path.as_os_str().is_empty() || rel_path.is_absolute() {
            return false;
        }
        self.rules
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }

    /// Repository root the rules are anchored at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn add_rule(builder: &mut GitignoreBuilder, line: &str) -> Result<(), IndexerError> {
    builder
        .add_line(None, line)
        .map_err(|e| invalid_rules(format!("Invalid ignore rule {:?}: {}", line, e)))?;
    Ok(())
}

fn invalid_rules(message: String) -> IndexerError {
    IndexerError::Config(CoreError::InvalidConfig(message))
}
