//! Configuration for a sync run.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-repository config file looked up by [`SyncConfig::discover`].
pub const CONFIG_FILE_NAME: &str = ".reposync.yaml";

/// Sync configuration.
///
/// `token_budget` has no default: the right budget depends on the embedding
/// model, so it must always be supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum tokens per chunk
    pub token_budget: usize,

    /// Maximum documents per upsert call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Model whose encoding is used for token counting
    #[serde(default = "default_encoding_model")]
    pub encoding_model: String,

    /// Embedding model of the on-disk store (`hashing-bow` or a local
    /// transformer model name)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Name of the collection holding commit pointer records
    #[serde(default = "default_meta_collection")]
    pub meta_collection: String,

    /// Directory of the on-disk vector store
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Skip files that fail to parse instead of aborting the sync
    #[serde(default)]
    pub skip_unparseable: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_batch_size() -> usize {
    100
}

fn default_encoding_model() -> String {
    "gpt-4o".to_string()
}

fn default_embedding_model() -> String {
    "hashing-bow".to_string()
}

fn default_meta_collection() -> String {
    "commits".to_string()
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reposync")
        .join("store")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SyncConfig {
    /// Build a config with the given budget and defaults for everything else.
    pub fn new(token_budget: usize) -> Self {
        Self {
            token_budget,
            batch_size: default_batch_size(),
            encoding_model: default_encoding_model(),
            embedding_model: default_embedding_model(),
            meta_collection: default_meta_collection(),
            store_dir: default_store_dir(),
            skip_unparseable: false,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/.reposync.yaml` if it exists.
    pub fn discover(root: &Path) -> Result<Option<Self>, CoreError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        tracing::debug!(path = ?path, "Loading config");
        Self::load_from(&path).map(Some)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.token_budget == 0 {
            return Err(CoreError::InvalidConfig(
                "token_budget must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(CoreError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "embedding_model must not be empty".to_string(),
            ));
        }
        if self.meta_collection.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "meta_collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
