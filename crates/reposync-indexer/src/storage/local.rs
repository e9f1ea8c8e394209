//! On-disk vector store: one MessagePack file per collection.

use super::collection::CollectionData;
use super::{CollectionInfo, Embedder, Metadata, QueryHit, Record, VectorStore, Where};
use crate::IndexerError;
use async_trait::async_trait;
use reposync_core::CoreError;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const EXTENSION: &str = "msgpack";

/// Collections loaded into memory, and which of them have unsaved writes.
#[derive(Default)]
struct Cache {
    collections: HashMap<String, CollectionData>,
    dirty: HashSet<String>,
}

/// Vector store persisting collections under a directory.
///
/// A collection is read from disk once and then served from memory. Writes
/// stay in memory until [`VectorStore::flush`], which rewrites the
/// collection file atomically (temp file, then rename), so a crash leaves
/// the last flushed contents. Only one `LocalStore` should have a directory
/// open at a time.
pub struct LocalStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    cache: Mutex<Cache>,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self, IndexerError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = ?dir, embedder = embedder.model_name(), "Opened local store");
        Ok(Self {
            dir,
            embedder,
            cache: Mutex::new(Cache::default()),
        })
    }

    /// Open the store for one repository under a shared base directory.
    ///
    /// Each repository gets its own subdirectory keyed by a hash of its
    /// canonical path, with one level below it per embedding model, so
    /// collections of different repositories or embedders never mix.
    pub async fn open_for_repo(
        base_dir: &Path,
        repo_root: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexerError> {
        let canonical = repo_root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(repo_root.to_path_buf()))?;
        let model_dir = embedder.model_name().to_string();
        validate_name(&model_dir)?;
        Self::open(base_dir.join(repo_key(&canonical)).join(model_dir), embedder).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf, IndexerError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }

    fn exists(&self, cache: &Cache, name: &str) -> Result<bool, IndexerError> {
        Ok(cache.collections.contains_key(name) || self.collection_path(name)?.exists())
    }

    async fn read(&self, name: &str) -> Result<CollectionData, IndexerError> {
        let path = self.collection_path(name)?;
        if !path.exists() {
            return Err(IndexerError::CollectionNotFound(name.to_string()));
        }
        let bytes = tokio::fs::read(&path).await?;
        let data: CollectionData = rmp_serde::from_slice(&bytes)?;
        debug!(path = ?path, records = data.len(), "Loaded collection");
        Ok(data.reindexed())
    }

    /// The cached collection, reading it from disk on first use.
    async fn loaded<'a>(
        &self,
        cache: &'a mut Cache,
        name: &str,
    ) -> Result<&'a mut CollectionData, IndexerError> {
        if !cache.collections.contains_key(name) {
            let data = self.read(name).await?;
            cache.collections.insert(name.to_string(), data);
        }
        cache
            .collections
            .get_mut(name)
            .ok_or_else(|| IndexerError::CollectionNotFound(name.to_string()))
    }

    async fn save(&self, name: &str, data: &CollectionData) -> Result<(), IndexerError> {
        let path = self.collection_path(name)?;
        let bytes = rmp_serde::to_vec(data)?;

        let temp_path = self.dir.join(format!(".{}.tmp", name));
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!(path = ?path, records = data.len(), size = bytes.len(), "Saved collection");
        Ok(())
    }
}

/// Short stable key for a repository path.
fn repo_key(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn validate_name(name: &str) -> Result<(), IndexerError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidConfig(format!("invalid collection name: {:?}", name)).into())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("dir", &self.dir)
            .field("embedder", &self.embedder.model_name())
            .finish()
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn create_collection(&self, name: &str) -> Result<(), IndexerError> {
        let mut cache = self.cache.lock().await;
        if self.exists(&cache, name)? {
            return Err(IndexerError::CollectionExists(name.to_string()));
        }
        cache.collections.insert(name.to_string(), CollectionData::default());
        cache.dirty.insert(name.to_string());
        Ok(())
    }

    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        let mut cache = self.cache.lock().await;
        let count = if self.exists(&cache, name)? {
            self.loaded(&mut cache, name).await?.len()
        } else {
            cache.collections.insert(name.to_string(), CollectionData::default());
            cache.dirty.insert(name.to_string());
            0
        };
        Ok(CollectionInfo {
            name: name.to_string(),
            count,
        })
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        let mut cache = self.cache.lock().await;
        let count = self.loaded(&mut cache, name).await?.len();
        Ok(CollectionInfo {
            name: name.to_string(),
            count,
        })
    }

    async fn fork(&self, source: &str, target: &str) -> Result<(), IndexerError> {
        let mut cache = self.cache.lock().await;
        if self.exists(&cache, target)? {
            return Err(IndexerError::CollectionExists(target.to_string()));
        }
        let copy = self.loaded(&mut cache, source).await?.clone();
        cache.collections.insert(target.to_string(), copy);
        cache.dirty.insert(target.to_string());

        debug!(source = %source, target = %target, "Forked collection");
        Ok(())
    }

    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexerError> {
        let documents: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = self.embedder.embed(&documents).await?;

        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache, collection)
            .await?
            .upsert(records, embeddings);
        cache.dirty.insert(collection.to_string());
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        metadatas: Vec<Metadata>,
    ) -> Result<(), IndexerError> {
        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache, collection)
            .await?
            .update(ids, metadatas)?;
        cache.dirty.insert(collection.to_string());
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Where) -> Result<usize, IndexerError> {
        let mut cache = self.cache.lock().await;
        let removed = self.loaded(&mut cache, collection).await?.delete(filter);
        if removed > 0 {
            cache.dirty.insert(collection.to_string());
        }
        Ok(removed)
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&Where>,
    ) -> Result<Vec<Record>, IndexerError> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache, collection).await?.get(filter))
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>, IndexerError> {
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let mut cache = self.cache.lock().await;
        Ok(self
            .loaded(&mut cache, collection)
            .await?
            .query(&embedding, n_results, filter))
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexerError> {
        let cache = self.cache.lock().await;
        let mut names: Vec<String> = cache.collections.keys().cloned().collect();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn has_collection(&self, name: &str) -> Result<bool, IndexerError> {
        let cache = self.cache.lock().await;
        self.exists(&cache, name)
    }

    async fn flush(&self, collection: &str) -> Result<(), IndexerError> {
        let mut cache = self.cache.lock().await;
        if !cache.dirty.remove(collection) {
            return Ok(());
        }
        let result = match cache.collections.get(collection) {
            Some(data) => self.save(collection, data).await,
            None => return Ok(()),
        };
        if result.is_err() {
            cache.dirty.insert(collection.to_string());
        }
        result
    }
}
