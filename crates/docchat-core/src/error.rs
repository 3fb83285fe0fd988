//! Error types for docchat.
//!
//! Each pipeline stage has its own error enum. The four boundary errors
//! ([`ConfigError`], [`IngestError`], [`RetrievalError`], [`GenerationError`])
//! are what callers of the index builder and the conversational pipeline see.

use thiserror::Error;

/// Main error type for docchat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is invalid or incomplete
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Document ingestion failed
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Context retrieval failed
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Answer generation failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Document loading failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Segmentation failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. Fatal; surfaced at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported vector store backend: {0}")]
    UnsupportedBackend(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("unknown embedding model: {0}")]
    UnknownEmbedder(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion errors, one variant per pipeline stage.
///
/// The index is left unchanged whenever one of these is returned.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("load failed: {0}")]
    Load(#[from] ExtractError),

    #[error("segmentation failed: {0}")]
    Segment(#[from] ChunkError),

    #[error("insert failed: {0}")]
    Insert(#[from] StoreError),
}

/// Retrieval errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Embedding(#[from] EmbedError),
}

/// Generation errors raised by language-model backends.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("language model returned an empty response")]
    Empty,
}

/// Document loading errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("empty document")]
    Empty,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Chunking errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunking failed: {0}")]
    Failed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("dimension mismatch: index has {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("persist failed: {0}")]
    Persist(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for docchat operations.
pub type Result<T> = std::result::Result<T, Error>;
