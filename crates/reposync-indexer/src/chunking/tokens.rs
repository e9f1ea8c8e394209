//! Token counting for chunk budgets.

use crate::IndexerError;
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

/// Counts tokens in a piece of text under some fixed encoding.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE token counter for an OpenAI model's encoding.
pub struct TiktokenCounter {
    model: String,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load the encoding used by `model` (e.g. `gpt-4o`).
    pub fn for_model(model: &str) -> Result<Self, IndexerError> {
        let bpe = get_bpe_from_model(model)
            .map_err(|e| IndexerError::Tokenizer(format!("{}: {}", model, e)))?;
        Ok(Self {
            model: model.to_string(),
            bpe,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Adapts a plain function into a [`TokenCounter`].
pub struct FnCounter<F>(pub F);

impl<F> TokenCounter for FnCounter<F>
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        (self.0)(text)
    }
}
