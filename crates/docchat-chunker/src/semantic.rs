//! Semantic chunking strategy.
//!
//! Splits text into sentences, embeds each sentence together with its
//! neighbours, and starts a new chunk wherever the cosine distance between
//! consecutive groups exceeds a breakpoint threshold. Chunks therefore follow
//! topic shifts instead of a fixed width. A chunk longer than `chunk_size`
//! characters is re-split with the fixed window so it fits the embedder.

use async_trait::async_trait;
use docchat_core::{
    BreakpointThresholdType, Chunk, ChunkConfig, ChunkError, Chunker, ConfigError, Document,
    Embedder, EmbeddingConfig, META_START_CHAR,
};
use std::sync::Arc;
use tracing::debug;

use crate::fixed::FixedSizeChunker;

/// Embedding-distance chunker.
pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    threshold_type: BreakpointThresholdType,
    threshold_amount: f64,
    buffer_size: usize,
    embed_config: EmbeddingConfig,
    /// Caps chunk length
    splitter: FixedSizeChunker,
}

impl SemanticChunker {
    /// Create a semantic chunker with percentile thresholding at 95.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let threshold_type = BreakpointThresholdType::Percentile;
        Self {
            embedder,
            threshold_type,
            threshold_amount: threshold_type.default_amount(),
            buffer_size: 1,
            embed_config: EmbeddingConfig::default(),
            splitter: FixedSizeChunker::default(),
        }
    }

    /// Create a semantic chunker from configuration.
    pub fn from_config(
        embedder: Arc<dyn Embedder>,
        config: &ChunkConfig,
    ) -> Result<Self, ConfigError> {
        let amount = config.threshold_amount();
        let is_percentile = matches!(
            config.breakpoint_threshold_type,
            BreakpointThresholdType::Percentile | BreakpointThresholdType::Gradient
        );
        if is_percentile && !(0.0..=100.0).contains(&amount) {
            return Err(ConfigError::Invalid(format!(
                "breakpoint_threshold_amount ({amount}) must be a percentile within [0, 100]"
            )));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "breakpoint_threshold_amount ({amount}) must be non-negative"
            )));
        }

        Ok(Self {
            embedder,
            threshold_type: config.breakpoint_threshold_type,
            threshold_amount: amount,
            buffer_size: config.buffer_size,
            embed_config: EmbeddingConfig::default(),
            splitter: FixedSizeChunker::from_config(config)?,
        })
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        let sentences = split_sentences(&document.text);
        if sentences.is_empty() {
            return Ok(vec![]);
        }

        if sentences.len() == 1 {
            return Ok(self.emit(document, &sentences));
        }

        let groups = combine_sentences(&sentences, self.buffer_size);
        let group_refs: Vec<&str> = groups.iter().map(String::as_str).collect();
        let embeddings = self
            .embedder
            .embed_text(&group_refs, &self.embed_config)
            .await?;
        if embeddings.len() != groups.len() {
            return Err(ChunkError::Failed(format!(
                "embedder returned {} vectors for {} sentence groups",
                embeddings.len(),
                groups.len()
            )));
        }

        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0].embedding, &pair[1].embedding))
            .collect();

        let (threshold, scores) =
            breakpoint_threshold(&distances, self.threshold_type, self.threshold_amount);

        let mut chunks = Vec::new();
        let mut start = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > threshold {
                chunks.extend(self.emit(document, &sentences[start..=i]));
                start = i + 1;
            }
        }
        if start < sentences.len() {
            chunks.extend(self.emit(document, &sentences[start..]));
        }

        debug!(
            "Semantic split {} sentences into {} chunks (threshold {:.4})",
            sentences.len(),
            chunks.len(),
            threshold
        );
        Ok(chunks)
    }
}

impl SemanticChunker {
    /// Chunk(s) for one run of sentences.
    fn emit(&self, document: &Document, sentences: &[Sentence<'_>]) -> Vec<Chunk> {
        let text = sentences
            .iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join(" ");
        let start_char = sentences[0].start_char;
        let chunk = |text: String, offset: usize| {
            Chunk {
                text,
                metadata: document.metadata.clone(),
            }
            .with_metadata(META_START_CHAR, start_char + offset)
        };

        if text.chars().count() <= self.splitter.chunk_size() {
            return vec![chunk(text, 0)];
        }

        let windows = self.splitter.split(&text);
        debug!(
            "Semantic chunk of {} sentences re-split into {} windows",
            sentences.len(),
            windows.len()
        );
        windows
            .into_iter()
            .map(|(offset, window)| chunk(window, offset))
            .collect()
    }
}

/// A sentence and its character offset in the source text.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sentence<'a> {
    text: &'a str,
    start_char: usize,
}

/// Split on `.`, `?` or `!` followed by whitespace.
fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut push = |slice: &str, byte_start: usize| {
        let trimmed = slice.trim_start();
        let lead = slice.len() - trimmed.len();
        let trimmed = trimmed.trim_end();
        if !trimmed.is_empty() {
            let start_char = text[..byte_start + lead].chars().count();
            sentences.push(Sentence {
                text: &text[byte_start + lead..byte_start + lead + trimmed.len()],
                start_char,
            });
        }
    };

    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '?' | '!')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            let end = i + c.len_utf8();
            push(&text[start..end], start);
            start = end;
        }
    }
    if start < text.len() {
        push(&text[start..], start);
    }
    sentences
}

/// Join each sentence with `buffer` neighbours on either side.
fn combine_sentences(sentences: &[Sentence<'_>], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let lo = i.saturating_sub(buffer);
            let hi = (i + buffer + 1).min(sentences.len());
            sentences[lo..hi]
                .iter()
                .map(|s| s.text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Compute the breakpoint threshold and the per-gap scores compared against it.
///
/// Scores are the raw distances, except for `Gradient`, which compares their
/// gradient.
fn breakpoint_threshold(
    distances: &[f64],
    threshold_type: BreakpointThresholdType,
    amount: f64,
) -> (f64, Vec<f64>) {
    match threshold_type {
        BreakpointThresholdType::Percentile => (percentile(distances, amount), distances.to_vec()),
        BreakpointThresholdType::StandardDeviation => {
            let (mean, std) = mean_std(distances);
            (mean + amount * std, distances.to_vec())
        }
        BreakpointThresholdType::Interquartile => {
            let (mean, _) = mean_std(distances);
            let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
            (mean + amount * iqr, distances.to_vec())
        }
        BreakpointThresholdType::Gradient => {
            let grads = gradient(distances);
            (percentile(&grads, amount), grads)
        }
    }
}

/// Linear-interpolated percentile.
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Central differences inside, one-sided at the edges.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    (0..n)
        .map(|i| {
            if i == 0 {
                values[1] - values[0]
            } else if i == n - 1 {
                values[n - 1] - values[n - 2]
            } else {
                (values[i + 1] - values[i - 1]) / 2.0
            }
        })
        .collect()
}
