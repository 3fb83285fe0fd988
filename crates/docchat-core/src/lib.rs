//! # docchat-core
//!
//! Core types and traits for docchat, a retrieval-augmented chat over PDF
//! documents.
//!
//! This crate provides the foundational abstractions used throughout docchat:
//!
//! - **Document Loading**: [`DocumentLoader`] trait for turning PDFs into page documents
//! - **Document Chunking**: [`Chunker`] trait for splitting pages into bounded chunks
//! - **Embedding Generation**: [`Embedder`] trait for converting text to vectors
//! - **Vector Storage**: [`VectorStore`] and [`Retriever`] traits for indexing and search
//! - **Generation**: [`LanguageModel`] trait for streamed or batch answers
//!
//! ## Architecture
//!
//! ```text
//! PDF → DocumentLoader → Chunker → VectorStore (embeds via Embedder)
//!                                       ↓
//!        question → Retriever → prompt → LanguageModel → fragments
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Document`] | One loaded page with loader metadata |
//! | [`Chunk`] | A bounded text segment with metadata |
//! | [`VectorRecord`] | A content-addressed chunk with its embedding |
//! | [`Message`] | One entry of a session's history |
//! | [`ChatRequest`] | A fully assembled language-model request |
//! | [`SearchConfig`] | Retriever mode and MMR parameters |
//!
//! ## Errors
//!
//! | Error | Raised by | Surfaced as |
//! |-------|-----------|-------------|
//! | [`ConfigError`] | configuration and factories | fatal at startup |
//! | [`IngestError`] | the index builder | `Err` from `ingest` |
//! | [`RetrievalError`] | retrievers | a terminal answer fragment |
//! | [`GenerationError`] | language models | a terminal answer fragment |
//!
//! ## Related Crates
//!
//! - `docchat-extract`: PDF loading
//! - `docchat-chunker`: fixed-window and semantic segmentation
//! - `docchat-embed`: embedding functions (Candle BERT, no-op)
//! - `docchat-store`: the local vector index and MMR retrieval
//! - `docchat-index`: ingestion orchestration
//! - `docchat-chat`: session history, language models, the conversational pipeline

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    ChunkError, ConfigError, EmbedError, Error, ExtractError, GenerationError, IngestError,
    Result, RetrievalError, StoreError,
};
pub use traits::*;
pub use types::*;
