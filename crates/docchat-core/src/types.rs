//! Core types for docchat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ============================================================================
// Metadata
// ============================================================================

/// Metadata key for the originating file name.
pub const META_SOURCE_FILE: &str = "source_file";
/// Metadata key for the document kind (always `"pdf"` for now).
pub const META_DOCUMENT_TYPE: &str = "document_type";
/// Metadata key for the 0-based page index.
pub const META_PAGE: &str = "page";
/// Metadata key for the loader's source path.
pub const META_SOURCE: &str = "source";
/// Metadata key for the character offset of a chunk within its page.
pub const META_START_CHAR: &str = "start_char";

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Borrow the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as an integer, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered metadata map. Ordering keeps serialization canonical.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Documents and Chunks
// ============================================================================

/// A loaded unit of document text, usually one PDF page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Page text
    pub text: String,
    /// Loader metadata (`page`, `source`)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A bounded segment of document text plus metadata.
///
/// Chunks are the atomic unit stored in and returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text
    pub text: String,
    /// Metadata (`source_file`, `document_type`, `page`, `start_char`)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    /// Create a chunk with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `source_file` metadata entry, if set.
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE_FILE).and_then(MetadataValue::as_str)
    }

    /// The `page` metadata entry, if set.
    #[must_use]
    pub fn page(&self) -> Option<i64> {
        self.metadata.get(META_PAGE).and_then(MetadataValue::as_i64)
    }

    /// Content address of this chunk: BLAKE3 over text and canonical metadata.
    ///
    /// Identical text from different sources or offsets yields different ids.
    #[must_use]
    pub fn content_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.text.as_bytes());
        hasher.update(&[0]);
        for (key, value) in &self.metadata {
            hasher.update(key.as_bytes());
            hasher.update(&[0x1f]);
            hasher.update(value.to_string().as_bytes());
            hasher.update(&[0x1e]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// A stored chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Content address (see [`Chunk::content_id`])
    pub id: String,
    /// The chunk
    pub chunk: Chunk,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

// ============================================================================
// Conversation
// ============================================================================

/// One message of a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "text", rename_all = "lowercase")]
pub enum Message {
    Human(String),
    Assistant(String),
}

impl Message {
    /// Role label (`"human"` or `"assistant"`).
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::Human(_) => "human",
            Self::Assistant(_) => "assistant",
        }
    }

    /// Message text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Human(text) | Self::Assistant(text) => text,
        }
    }
}

/// Role of a message sent to a language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message in a language-model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let role = match message {
            Message::Human(_) => ChatRole::User,
            Message::Assistant(_) => ChatRole::Assistant,
        };
        Self {
            role,
            content: message.text().to_string(),
        }
    }
}

/// A fully assembled language-model request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Append a system message.
    pub fn system(&mut self, content: impl Into<String>) -> &mut Self {
        self.push(ChatRole::System, content)
    }

    /// Append a user message.
    pub fn user(&mut self, content: impl Into<String>) -> &mut Self {
        self.push(ChatRole::User, content)
    }

    /// Append an assistant message.
    pub fn assistant(&mut self, content: impl Into<String>) -> &mut Self {
        self.push(ChatRole::Assistant, content)
    }

    fn push(&mut self, role: ChatRole, content: impl Into<String>) -> &mut Self {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
        self
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// Segmentation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Sliding character window with overlap
    #[default]
    Fixed,
    /// Embedding-distance breakpoints between sentence groups
    Semantic,
}

/// How the semantic chunker derives its breakpoint threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointThresholdType {
    #[default]
    Percentile,
    StandardDeviation,
    Interquartile,
    Gradient,
}

impl BreakpointThresholdType {
    /// Amount used when none is configured.
    #[must_use]
    pub fn default_amount(self) -> f64 {
        match self {
            Self::Percentile | Self::Gradient => 95.0,
            Self::StandardDeviation => 3.0,
            Self::Interquartile => 1.5,
        }
    }
}

/// Configuration for chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Strategy to use
    #[serde(default)]
    pub strategy: ChunkStrategy,
    /// Window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive windows in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Semantic breakpoint threshold type
    #[serde(default)]
    pub breakpoint_threshold_type: BreakpointThresholdType,
    /// Semantic breakpoint threshold amount (per-type default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoint_threshold_amount: Option<f64>,
    /// Sentences grouped on each side when embedding for semantic splits
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_buffer_size() -> usize {
    1
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            breakpoint_threshold_type: BreakpointThresholdType::default(),
            breakpoint_threshold_amount: None,
            buffer_size: default_buffer_size(),
        }
    }
}

impl ChunkConfig {
    /// Effective breakpoint threshold amount.
    #[must_use]
    pub fn threshold_amount(&self) -> f64 {
        self.breakpoint_threshold_amount
            .unwrap_or_else(|| self.breakpoint_threshold_type.default_amount())
    }

    /// Check window bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Output from embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Search
// ============================================================================

/// Retrieval mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Plain top-k by cosine similarity
    Similarity,
    /// Maximal marginal relevance re-ranking
    #[default]
    Mmr,
}

/// Retriever configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Retrieval mode
    pub search_type: SearchType,
    /// Number of chunks returned
    pub k: usize,
    /// Candidates fetched before MMR re-ranking
    pub fetch_k: usize,
    /// Relevance/diversity balance, 1.0 = pure relevance
    pub lambda_mult: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::Mmr,
            k: 6,
            fetch_k: 20,
            lambda_mult: 0.7,
        }
    }
}

impl SearchConfig {
    /// Check bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::Invalid("top_k must be greater than 0".to_string()));
        }
        if self.fetch_k < self.k {
            return Err(ConfigError::Invalid(format!(
                "fetch_k ({}) must be at least top_k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(ConfigError::Invalid(format!(
                "lambda_mult ({}) must be within [0, 1]",
                self.lambda_mult
            )));
        }
        Ok(())
    }
}

/// A single similarity-search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matching chunk
    pub chunk: Chunk,
    /// Its stored embedding
    pub embedding: Vec<f32>,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Similarity-search output, most similar first.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Embedding of the query text
    pub query_embedding: Vec<f32>,
    /// Hits ordered by descending score
    pub hits: Vec<SearchHit>,
}

/// Vector store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored records
    pub total_records: u64,
    /// Distinct `source_file` values
    pub total_sources: u64,
    /// Embedding dimension
    pub dimension: usize,
    /// Embedding model the index was built with
    pub embedding_model: String,
    /// Last write time
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Backends
// ============================================================================

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreBackend {
    /// Content-addressed local index with a JSON snapshot
    #[default]
    #[serde(alias = "default")]
    Local,
}

impl FromStr for VectorStoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "default" => Ok(Self::Local),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for VectorStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
        }
    }
}
