//! No-op embedder for offline use and tests.
//!
//! Every vector is zero, so all cosine scores tie at 0 and the local index
//! hands back chunks in insertion order. Selected with
//! `embedding_model_name = "noop"` to run ingest and chat without Candle.

use async_trait::async_trait;
use docchat_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Default dimension, matching `all-MiniLM-L6-v2`.
pub const NOOP_DIMENSION: usize = 384;

/// Embedder producing zero vectors of a fixed dimension.
///
/// An index built with it reopens only under an embedder of the same
/// dimension.
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    /// Zero vectors of [`NOOP_DIMENSION`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(NOOP_DIMENSION)
    }

    /// Zero vectors of `dimension` entries.
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for NoopEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    fn model_name(&self) -> &str {
        "noop"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        512
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        _config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|passage| EmbeddingOutput {
                embedding: vec![0.0; self.dimension],
                token_count: passage.split_whitespace().count(),
            })
            .collect())
    }
}
