//! Local transformer embeddings via fastembed.
//!
//! Models are downloaded from Hugging Face on first use and cached; after
//! that, embedding runs offline.

use super::Embedder;
use crate::IndexerError;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// [`Embedder`] running a fastembed model on the blocking pool.
pub struct FastEmbedder {
    model_name: String,
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    /// Load (downloading if needed) the model named `model_name`.
    pub async fn load(model_name: &str) -> Result<Self, IndexerError> {
        let model = model_for_name(model_name)?;
        let loaded = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
        })
        .await
        .map_err(|e| IndexerError::Embedding(e.to_string()))?
        .map_err(|e| {
            IndexerError::Embedding(format!("failed to load model {}: {}", model_name, e))
        })?;

        info!(model = %model_name, "Loaded embedding model");
        Ok(Self {
            model_name: model_name.to_string(),
            model: Arc::new(Mutex::new(loaded)),
        })
    }
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexerError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.lock().embed(texts, None))
            .await
            .map_err(|e| IndexerError::Embedding(e.to_string()))?
            .map_err(|e| IndexerError::Embedding(e.to_string()))
    }
}

fn model_for_name(name: &str) -> Result<EmbeddingModel, IndexerError> {
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(IndexerError::Embedding(format!(
            "unknown embedding model {:?}; supported: all-minilm-l6-v2, bge-small-en-v1.5, \
             bge-base-en-v1.5, bge-large-en-v1.5, nomic-embed-text-v1.5",
            other
        ))),
    }
}
