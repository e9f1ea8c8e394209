//! Record storage shared by the in-memory and on-disk backends.

use super::embedding::cosine_similarity;
use super::{Metadata, QueryHit, Record, Where};
use crate::IndexerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    record: Record,
    embedding: Vec<f32>,
}

/// The records of one collection, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    records: Vec<StoredRecord>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl CollectionData {
    /// Rebuild the id index after deserialization.
    pub(crate) fn reindexed(mut self) -> Self {
        self.reindex();
        self
    }

    fn reindex(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.record.id.clone(), i))
            .collect();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Insert or replace records; `embeddings` is parallel to `records`.
    pub(crate) fn upsert(&mut self, records: Vec<Record>, embeddings: Vec<Vec<f32>>) {
        for (record, embedding) in records.into_iter().zip(embeddings) {
            let stored = StoredRecord { record, embedding };
            match self.positions.get(&stored.record.id) {
                Some(&i) => self.records[i] = stored,
                None => {
                    self.positions
                        .insert(stored.record.id.clone(), self.records.len());
                    self.records.push(stored);
                }
            }
        }
    }

    /// Merge `metadatas` into the records named by `ids`.
    pub(crate) fn update(&mut self, ids: &[String], metadatas: Vec<Metadata>) -> Result<(), IndexerError> {
        if ids.len() != metadatas.len() {
            return Err(IndexerError::Storage(format!(
                "update got {} ids but {} metadatas",
                ids.len(),
                metadatas.len()
            )));
        }
        if let Some(missing) = ids.iter().find(|id| !self.positions.contains_key(*id)) {
            return Err(IndexerError::Storage(format!("unknown record id: {}", missing)));
        }
        for (id, metadata) in ids.iter().zip(metadatas) {
            let i = self.positions[id];
            self.records[i].record.metadata.extend(metadata);
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, filter: &Where) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !filter.matches(&r.record.metadata));
        let removed = before - self.records.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub(crate) fn get(&self, filter: Option<&Where>) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.record.metadata)))
            .map(|r| r.record.clone())
            .collect()
    }

    pub(crate) fn query(&self, embedding: &[f32], n_results: usize, filter: Option<&Where>) -> Vec<QueryHit> {
        let mut hits: Vec<QueryHit> = self
            .records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.record.metadata)))
            .map(|r| QueryHit {
                record: r.record.clone(),
                score: cosine_similarity(embedding, &r.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(n_results);
        hits
    }
}
