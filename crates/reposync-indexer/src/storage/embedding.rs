//! Embedding functions used by the vector stores.

use crate::IndexerError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Model name of [`HashingEmbedder`].
pub const HASHING_MODEL: &str = "hashing-bow";

/// Turns documents into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed each text, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError>;
}

/// Deterministic local embedder: feature-hashed bag of identifier parts.
///
/// Identifiers are split on non-alphanumerics and camelCase boundaries and
/// lowercased, each part is hashed into one of `dims` buckets, and the
/// vector is L2-normalized. Good enough for offline lexical similarity; no
/// model download or network access.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for term in terms(text) {
            let digest = Sha256::digest(term.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            vector[index] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        HASHING_MODEL
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the embedder named by `model`.
///
/// [`HASHING_MODEL`] needs nothing else; any other name is a local
/// transformer model and needs the `local-embeddings` feature.
pub async fn create_embedder(model: &str) -> Result<Arc<dyn Embedder>, IndexerError> {
    if model == HASHING_MODEL {
        return Ok(Arc::new(HashingEmbedder::default()));
    }
    #[cfg(feature = "local-embeddings")]
    {
        Ok(Arc::new(super::local_model::FastEmbedder::load(model).await?))
    }
    #[cfg(not(feature = "local-embeddings"))]
    {
        Err(IndexerError::Embedding(format!(
            "embedding model {:?} requires building with --features local-embeddings",
            model
        )))
    }
}

/// Lowercased identifier parts of `text`.
fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Cosine similarity between two vectors; 0 when either is zero or the
/// lengths differ.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
