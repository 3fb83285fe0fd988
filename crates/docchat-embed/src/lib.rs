//! # docchat-embed
//!
//! Embedding functions for docchat.
//!
//! The same embedder must be used to build an index and to query it; the
//! store records the model name in its snapshot and warns on a mismatch.
//!
//! ## Cargo Features
//!
//! - `candle` (default): Enables [`CandleEmbedder`] for local BERT-family models
//! - Without `candle`: Only [`NoopEmbedder`] is available (for testing/development)
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CandleEmbedder`] | Mean-pooled BERT embeddings via Candle (requires `candle` feature) |
//! | [`NoopEmbedder`] | Zero-vector embedder for offline runs and tests |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docchat_embed::create_embedder;
//!
//! let embedder = create_embedder("sentence-transformers/all-MiniLM-L6-v2", cache_dir).await?;
//! ```

#[cfg(feature = "candle")]
pub mod candle;
pub mod noop;

#[cfg(feature = "candle")]
pub use candle::{CandleEmbedder, DEFAULT_MODEL_ID};
pub use noop::NoopEmbedder;

use docchat_core::{ConfigError, Embedder, Error};
use std::path::PathBuf;
use std::sync::Arc;

/// Build the embedder named in configuration.
///
/// `"noop"` selects [`NoopEmbedder`]; any other name is treated as a Hugging
/// Face model id and needs the `candle` feature.
pub async fn create_embedder(
    model_name: &str,
    cache_dir: PathBuf,
) -> Result<Arc<dyn Embedder>, Error> {
    if model_name.eq_ignore_ascii_case("noop") {
        return Ok(Arc::new(NoopEmbedder::new()));
    }

    #[cfg(feature = "candle")]
    {
        let embedder = CandleEmbedder::load(model_name, cache_dir).await?;
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "candle"))]
    {
        let _ = cache_dir;
        Err(ConfigError::UnknownEmbedder(format!(
            "{model_name} (built without the `candle` feature)"
        ))
        .into())
    }
}

/// Reject an empty model name before any download is attempted.
pub fn validate_model_name(model_name: &str) -> Result<(), ConfigError> {
    if model_name.trim().is_empty() {
        return Err(ConfigError::UnknownEmbedder("<empty>".to_string()));
    }
    Ok(())
}
