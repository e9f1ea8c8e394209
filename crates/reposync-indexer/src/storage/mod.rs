//! Vector-store collaborator and the batched upsert pipeline.
//!
//! Collections are addressed by name: one per indexed commit, plus the
//! meta-collection holding commit pointer records. Two backends are
//! provided: [`MemoryStore`] for in-process use and tests, and
//! [`LocalStore`], which persists each collection as a MessagePack file.

mod batch;
mod collection;
mod embedding;
mod local;
#[cfg(feature = "local-embeddings")]
mod local_model;
mod memory;

pub use batch::{add_batch, chunk_from_record, chunk_record, BatchBuffer, BatchStats};
pub use embedding::{create_embedder, Embedder, HashingEmbedder, HASHING_MODEL};
#[cfg(feature = "local-embeddings")]
pub use local_model::FastEmbedder;
pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::IndexerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        MetadataValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

/// Record metadata, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored document with its id and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// A query result with its cosine similarity to the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub record: Record,
    pub score: f32,
}

/// Summary of an existing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
}

/// Metadata filter for `get`, `delete` and `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Where {
    /// Field equals value
    Eq(String, MetadataValue),
    /// Field equals one of the values
    In(String, Vec<MetadataValue>),
    /// All sub-filters match
    And(Vec<Where>),
}

impl Where {
    pub fn eq(key: &str, value: impl Into<MetadataValue>) -> Self {
        Where::Eq(key.to_string(), value.into())
    }

    pub fn is_in<V: Into<MetadataValue>>(key: &str, values: impl IntoIterator<Item = V>) -> Self {
        Where::In(key.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Where::Eq(key, value) => metadata.get(key) == Some(value),
            Where::In(key, values) => metadata.get(key).is_some_and(|v| values.contains(v)),
            Where::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// Named-collection vector store.
///
/// `add` has upsert semantics: a record whose id already exists replaces the
/// stored one.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create an empty collection; fails if it exists.
    async fn create_collection(&self, name: &str) -> Result<(), IndexerError>;

    /// Create the collection unless it already exists.
    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError>;

    /// Describe an existing collection.
    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError>;

    /// Copy `source` into a new collection `target`.
    async fn fork(&self, source: &str, target: &str) -> Result<(), IndexerError>;

    /// Insert or replace records.
    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexerError>;

    /// Merge new metadata fields into existing records.
    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        metadatas: Vec<Metadata>,
    ) -> Result<(), IndexerError>;

    /// Delete matching records, returning how many were removed.
    async fn delete(&self, collection: &str, filter: &Where) -> Result<usize, IndexerError>;

    /// Fetch matching records (all records when `filter` is `None`).
    async fn get(&self, collection: &str, filter: Option<&Where>)
        -> Result<Vec<Record>, IndexerError>;

    /// The `n_results` records most similar to `text`.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>, IndexerError>;

    /// Names of all collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>, IndexerError>;

    /// Make pending writes to `collection` durable.
    ///
    /// Stores that write through on every call keep the default no-op.
    async fn flush(&self, _collection: &str) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, IndexerError> {
        match self.get_collection(name).await {
            Ok(_) => Ok(true),
            Err(IndexerError::CollectionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
