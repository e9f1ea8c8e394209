//! In-process vector store.

use super::collection::CollectionData;
use super::{CollectionInfo, Embedder, Metadata, QueryHit, Record, VectorStore, Where};
use crate::IndexerError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Vector store holding every collection in memory.
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&CollectionData) -> T,
    ) -> Result<T, IndexerError> {
        let collections = self.collections.read();
        collections
            .get(name)
            .map(f)
            .ok_or_else(|| IndexerError::CollectionNotFound(name.to_string()))
    }

    fn with_collection_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut CollectionData) -> T,
    ) -> Result<T, IndexerError> {
        let mut collections = self.collections.write();
        collections
            .get_mut(name)
            .map(f)
            .ok_or_else(|| IndexerError::CollectionNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("embedder", &self.embedder.model_name())
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> Result<(), IndexerError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(IndexerError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), CollectionData::default());
        debug!(collection = %name, "Created collection");
        Ok(())
    }

    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        let mut collections = self.collections.write();
        let data = collections.entry(name.to_string()).or_default();
        Ok(CollectionInfo {
            name: name.to_string(),
            count: data.len(),
        })
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        self.with_collection(name, |data| CollectionInfo {
            name: name.to_string(),
            count: data.len(),
        })
    }

    async fn fork(&self, source: &str, target: &str) -> Result<(), IndexerError> {
        let mut collections = self.collections.write();
        if collections.contains_key(target) {
            return Err(IndexerError::CollectionExists(target.to_string()));
        }
        let copy = collections
            .get(source)
            .cloned()
            .ok_or_else(|| IndexerError::CollectionNotFound(source.to_string()))?;
        debug!(source = %source, target = %target, records = copy.len(), "Forked collection");
        collections.insert(target.to_string(), copy);
        Ok(())
    }

    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexerError> {
        self.get_collection(collection).await?;
        let documents: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = self.embedder.embed(&documents).await?;
        self.with_collection_mut(collection, |data| data.upsert(records, embeddings))
    }

    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        metadatas: Vec<Metadata>,
    ) -> Result<(), IndexerError> {
        self.with_collection_mut(collection, |data| data.update(ids, metadatas))?
    }

    async fn delete(&self, collection: &str, filter: &Where) -> Result<usize, IndexerError> {
        self.with_collection_mut(collection, |data| data.delete(filter))
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&Where>,
    ) -> Result<Vec<Record>, IndexerError> {
        self.with_collection(collection, |data| data.get(filter))
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>, IndexerError> {
        self.get_collection(collection).await?;
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();
        self.with_collection(collection, |data| data.query(&embedding, n_results, filter))
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexerError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HashingEmbedder;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(HashingEmbedder::default()))
    }

    fn record(id: &str, document: &str, path: &str) -> Record {
        Record {
            id: id.to_string(),
            document: document.to_string(),
            metadata: [("filePath".to_string(), path.into())].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = store();
        store.create_collection("c1").await.unwrap();
        let result = store.create_collection("c1").await;
        assert!(matches!(result, Err(IndexerError::CollectionExists(_))));
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = store();
        assert!(!store.has_collection("nope").await.unwrap());
        let result = store.add("nope", vec![record("1", "x", "a.ts")]).await;
        assert!(matches!(result, Err(IndexerError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_fork_is_independent() {
        let store = store();
        store.create_collection("c1").await.unwrap();
        store
            .add("c1", vec![record("1", "fn a", "a.ts"), record("2", "fn b", "b.ts")])
            .await
            .unwrap();

        store.fork("c1", "c2").await.unwrap();
        store.delete("c2", &Where::eq("filePath", "a.ts")).await.unwrap();

        assert_eq!(store.get_collection("c1").await.unwrap().count, 2);
        assert_eq!(store.get_collection("c2").await.unwrap().count, 1);
        assert_eq!(store.list_collections().await.unwrap(), vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_fork_onto_existing_fails() {
        let store = store();
        store.create_collection("c1").await.unwrap();
        store.create_collection("c2").await.unwrap();
        assert!(matches!(
            store.fork("c1", "c2").await,
            Err(IndexerError::CollectionExists(_))
        ));
        assert!(matches!(
            store.fork("c3", "c4").await,
            Err(IndexerError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_query_prefers_matching_document() {
        let store = store();
        store.create_collection("c1").await.unwrap();
        store
            .add(
                "c1",
                vec![
                    record("1", "function loadUser(id) { return users.get(id); }", "a.ts"),
                    record("2", "class Renderer { paint(canvas) {} }", "b.ts"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("c1", "load user", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "1");

        let filtered = store
            .query("c1", "load user", 5, Some(&Where::eq("filePath", "b.ts")))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.id, "2");
    }
}
