//! Version-control collaborator.

use crate::IndexerError;
use async_trait::async_trait;
use reposync_core::{Commit, Diff};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves HEAD and path-level diffs between commits.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// The commit currently checked out.
    async fn head(&self) -> Result<Commit, IndexerError>;

    /// Paths changed from `old` to `new`.
    async fn diff(&self, old: &str, new: &str) -> Result<Diff, IndexerError>;
}

/// [`Vcs`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<String, IndexerError> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .await
            .map_err(|e| IndexerError::Vcs(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(IndexerError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn head(&self) -> Result<Commit, IndexerError> {
        let id = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
        if id.is_empty() {
            return Err(IndexerError::Vcs("git rev-parse HEAD returned nothing".into()));
        }
        let message = self.git(&["log", "-1", "--format=%B", &id]).await?;
        Ok(Commit::new(id, message.trim_end()))
    }

    async fn diff(&self, old: &str, new: &str) -> Result<Diff, IndexerError> {
        let out = self
            .git(&["diff", "--name-status", "-z", "-M", "--relative", old, new])
            .await?;
        let diff = parse_name_status(&out);
        debug!(
            old = %old,
            new = %new,
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            "Computed diff"
        );
        Ok(diff)
    }
}

/// Parse `git diff --name-status -z` output.
///
/// Fields are NUL-terminated: a status, then one path, or two paths for
/// renames and copies. Paths are taken verbatim, never C-quoted.
///
/// `A` is added, `M` and `T` are modified, `D` is deleted. A rename `R`
/// deletes the old path and adds the new one; a copy `C` adds the new path.
pub fn parse_name_status(output: &str) -> Diff {
    let mut diff = Diff::default();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());

    while let Some(status) = fields.next() {
        let kind = status.chars().next();
        let paths = if matches!(kind, Some('R' | 'C')) { 2 } else { 1 };
        let Some(path) = fields.next() else {
            debug!(status = %status, "Truncated name-status entry");
            break;
        };
        let target = if paths == 2 { fields.next() } else { None };

        match (kind, target) {
            (Some('A'), _) => diff.added.push(path.to_string()),
            (Some('M' | 'T'), _) => diff.modified.push(path.to_string()),
            (Some('D'), _) => diff.deleted.push(path.to_string()),
            (Some('R'), Some(new_path)) => {
                diff.deleted.push(path.to_string());
                diff.added.push(new_path.to_string());
            }
            (Some('C'), Some(new_path)) => diff.added.push(new_path.to_string()),
            _ => debug!(status = %status, path = %path, "Ignoring name-status entry"),
        }
    }

    diff
}
