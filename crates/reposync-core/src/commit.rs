//! Commit, diff and pointer values shared by the VCS collaborator and the
//! sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A resolved commit: its id and full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash
    pub id: String,
    /// Commit message (may be empty)
    pub message: String,
}

impl Commit {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Path-level changes between two commits.
///
/// Paths are relative to the repository root, `/`-separated. A rename shows
/// up as its old path in `deleted` and its new path in `added`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Diff {
    /// True when no path changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Every path whose chunks must be dropped from the forked snapshot,
    /// deduplicated and sorted.
    pub fn touched(&self) -> Vec<String> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Paths that must be re-segmented and re-inserted (added then modified,
    /// first occurrence wins).
    pub fn reindexed(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.added
            .iter()
            .chain(&self.modified)
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }
}

/// A commit-pointer record from the meta-collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPointer {
    /// Indexed commit id, also the name of its collection
    pub commit_id: String,
    /// Commit message at index time
    pub message: String,
    /// Whether this is the latest indexed commit
    pub is_latest: bool,
    /// When the commit finished indexing
    pub indexed_at: Option<DateTime<Utc>>,
}

impl CommitPointer {
    /// A fresh pointer marked latest, stamped now.
    pub fn latest(commit: &Commit) -> Self {
        Self {
            commit_id: commit.id.clone(),
            message: commit.message.clone(),
            is_latest: true,
            indexed_at: Some(Utc::now()),
        }
    }

    /// The same record with its latest flag cleared.
    pub fn superseded(&self) -> Self {
        Self {
            is_latest: false,
            ..self.clone()
        }
    }
}
