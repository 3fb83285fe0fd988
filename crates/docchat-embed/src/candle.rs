//! BERT-family sentence embedder using Candle.
//!
//! Any Hugging Face repository with `tokenizer.json`, `config.json` and
//! `model.safetensors` for a BERT architecture works. Embeddings are mean
//! pooled over the attention mask and optionally L2 normalized.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use docchat_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Default sentence-embedding model.
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Fallback when `config.json` has no `max_position_embeddings`.
const DEFAULT_MAX_TOKENS: usize = 512;

/// Candle BERT embedder. Construct with [`CandleEmbedder::load`].
pub struct CandleEmbedder {
    model_id: String,
    device: Device,
    model: BertModel,
    tokenizer: Tokenizer,
    dimension: usize,
    max_tokens: usize,
}

impl CandleEmbedder {
    /// Download (if needed) and load a model into memory.
    pub async fn load(model_id: &str, cache_dir: PathBuf) -> Result<Self, EmbedError> {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        info!("Loading embedding model {} on {:?}", model_id, device);

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .build()
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to create HF API: {e}")))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        debug!("Fetching tokenizer...");
        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to download tokenizer: {e}")))?;

        debug!("Fetching config...");
        let config_path = repo
            .get("config.json")
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to download config: {e}")))?;

        debug!("Fetching weights...");
        let weights_path = repo
            .get("model.safetensors")
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to download weights: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to load tokenizer: {e}")))?;

        let config_str = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to read config: {e}")))?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to parse config: {e}")))?;
        let (dimension, max_tokens) = read_shape(&config_str)?;

        // SAFETY: the weights file lives in the hub cache and is only read.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| EmbedError::ModelLoad(format!("Failed to load weights: {e}")))?
        };

        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to create BERT model: {e}")))?;

        info!("Loaded {} (dimension {})", model_id, dimension);

        Ok(Self {
            model_id: model_id.to_string(),
            device,
            model,
            tokenizer,
            dimension,
            max_tokens,
        })
    }

    /// Encode a batch of texts.
    fn encode_batch(
        &self,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Inference(format!("Tokenization failed: {e}")))?;

        let max_len = encodings
            .iter()
            .map(|e| e.len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let batch_size = texts.len();
        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);
        let mut token_counts = Vec::with_capacity(batch_size);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let len = ids.len().min(max_len);
            token_counts.push(len);

            input_ids.extend_from_slice(&ids[..len]);
            attention_mask.extend(std::iter::repeat_n(1u32, len));
            // Pad
            input_ids.extend(std::iter::repeat_n(0u32, max_len - len));
            attention_mask.extend(std::iter::repeat_n(0u32, max_len - len));
        }

        let shape = (batch_size, max_len);
        let input_ids = Tensor::from_vec(input_ids, shape, &self.device)
            .map_err(|e| EmbedError::Inference(format!("input_ids tensor: {e}")))?;
        let attention_mask = Tensor::from_vec(attention_mask, shape, &self.device)
            .map_err(|e| EmbedError::Inference(format!("attention_mask tensor: {e}")))?;
        let token_type_ids = input_ids
            .zeros_like()
            .map_err(|e| EmbedError::Inference(format!("token_type_ids tensor: {e}")))?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EmbedError::Inference(format!("Model forward failed: {e}")))?;

        let pooled = mean_pooling(&output, &attention_mask)?;
        let embeddings = if normalize {
            l2_normalize(&pooled)?
        } else {
            pooled
        };

        let rows = embeddings
            .to_vec2::<f32>()
            .map_err(|e| EmbedError::Inference(format!("Failed to convert to vec: {e}")))?;

        Ok(rows
            .into_iter()
            .zip(token_counts)
            .map(|(embedding, token_count)| EmbeddingOutput {
                embedding,
                token_count,
            })
            .collect())
    }
}

/// Read `hidden_size` and `max_position_embeddings` from a BERT config.
fn read_shape(config_json: &str) -> Result<(usize, usize), EmbedError> {
    let value: serde_json::Value = serde_json::from_str(config_json)
        .map_err(|e| EmbedError::ModelLoad(format!("Failed to parse config: {e}")))?;

    let dimension = value
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| EmbedError::ModelLoad("config.json has no hidden_size".to_string()))?;
    let max_tokens = value
        .get("max_position_embeddings")
        .and_then(serde_json::Value::as_u64)
        .map_or(DEFAULT_MAX_TOKENS, |n| n as usize);

    Ok((dimension as usize, max_tokens))
}

/// Mean pooling with attention mask.
fn mean_pooling(token_embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbedError> {
    let inference = |e: candle_core::Error| EmbedError::Inference(format!("pooling failed: {e}"));

    let mask = attention_mask
        .unsqueeze(2)
        .and_then(|m| m.to_dtype(DType::F32))
        .and_then(|m| m.broadcast_as(token_embeddings.shape()))
        .map_err(inference)?;

    let sum = token_embeddings
        .mul(&mask)
        .and_then(|t| t.sum(1))
        .map_err(inference)?;
    let count = mask
        .sum(1)
        .and_then(|c| c.clamp(1e-9, f64::MAX))
        .map_err(inference)?;

    sum.div(&count).map_err(inference)
}

/// L2 normalize each row.
fn l2_normalize(embeddings: &Tensor) -> Result<Tensor, EmbedError> {
    let inference =
        |e: candle_core::Error| EmbedError::Inference(format!("normalization failed: {e}"));

    let norm = embeddings
        .sqr()
        .and_then(|t| t.sum_keepdim(1))
        .and_then(|t| t.sqrt())
        .and_then(|t| t.clamp(1e-12, f64::MAX))
        .map_err(inference)?;

    embeddings.broadcast_div(&norm).map_err(inference)
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with batch_size {}",
            texts.len(),
            config.batch_size
        );

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            results.extend(self.encode_batch(batch, config.normalize)?);
        }
        Ok(results)
    }
}
