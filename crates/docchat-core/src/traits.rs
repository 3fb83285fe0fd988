//! Core traits for docchat components.
//!
//! - [`DocumentLoader`]: Turn a PDF into page documents
//! - [`Chunker`]: Split a document into chunks
//! - [`Embedder`]: Generate vector embeddings
//! - [`VectorStore`]: Store and search chunk embeddings
//! - [`Retriever`]: Answer a query with relevant chunks
//! - [`LanguageModel`]: Generate an answer from a chat request

use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{
    ChunkError, EmbedError, ExtractError, GenerationError, RetrievalError, StoreError,
};
use crate::types::{
    ChatRequest, Chunk, Document, EmbeddingConfig, EmbeddingOutput, SearchConfig,
    SearchResults, StoreStats,
};

// ============================================================================
// Document Loading
// ============================================================================

/// Trait for loading documents from files.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Loader name, used in logs.
    fn name(&self) -> &str;

    /// Load a file into an ordered sequence of page documents.
    async fn load(&self, path: &Path) -> Result<Vec<Document>, ExtractError>;
}

// ============================================================================
// Chunking
// ============================================================================

/// Trait for splitting documents into chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Name of this chunking strategy.
    fn name(&self) -> &str;

    /// Chunk one document. Its metadata is copied onto every chunk.
    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum tokens per input.
    fn max_tokens(&self) -> usize;

    /// Embed text content.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query.
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Trait for vector storage and search.
///
/// Insertion and query vectorization go through the same embedder, which the
/// store owns.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embedding dimension, fixed per index.
    fn dimension(&self) -> usize;

    /// Embed and insert chunks. All-or-nothing; returns the number inserted.
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<usize, StoreError>;

    /// Plain top-k similarity search with the store's default k.
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Top-k similarity search returning scores and stored embeddings.
    async fn similarity_search(&self, query: &str, k: usize)
    -> Result<SearchResults, StoreError>;

    /// Re-establish the index from its durable backing store.
    async fn persist(&self) -> Result<(), StoreError>;

    /// Build a retriever over this store.
    fn as_retriever(&self, config: SearchConfig) -> Arc<dyn Retriever>;

    /// Number of stored records.
    async fn len(&self) -> usize;

    /// Whether the store holds no records.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get store statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Trait for answering a query with relevant chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks for a query, most relevant first.
    async fn invoke(&self, query: &str) -> Result<Vec<Chunk>, RetrievalError>;
}

// ============================================================================
// Language Models
// ============================================================================

/// A stream of answer fragments from a language model.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Trait for language-model backends.
///
/// Backends that cannot stream only implement [`complete`](Self::complete);
/// the default [`stream`](Self::stream) yields the whole answer as one fragment.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Whether [`stream`](Self::stream) yields incremental fragments.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Generate a complete answer.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError>;

    /// Generate an answer as a stream of fragments.
    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, GenerationError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}
