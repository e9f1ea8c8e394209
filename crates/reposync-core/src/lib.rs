//! RepoSync Core Components
//!
//! Shared types for the RepoSync indexer: commit and diff values exchanged
//! with the version-control collaborator, the commit pointer that tracks the
//! latest indexed snapshot, and the sync configuration.

mod commit;
mod config;
mod error;

pub use commit::{Commit, CommitPointer, Diff};
pub use config::{SyncConfig, CONFIG_FILE_NAME};
pub use error::CoreError;
