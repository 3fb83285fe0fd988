//! Vector index and retrieval for docchat.
//!
//! This crate implements the [`VectorStore`] trait with a content-addressed
//! local index, and the [`Retriever`](docchat_core::Retriever) used at query
//! time.
//!
//! # Features
//!
//! - **Content addressing**: re-inserting an identical chunk is a no-op
//! - **Atomic snapshots**: `index.json` is replaced by rename, never rewritten in place
//! - **MMR retrieval**: similarity candidates re-ranked for diversity
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_store::create_vector_store;
//! use docchat_core::{SearchConfig, VectorStore, VectorStoreBackend};
//!
//! let store = create_vector_store(VectorStoreBackend::Local, Some(dir), embedder).await?;
//! store.add_documents(chunks).await?;
//!
//! let retriever = store.as_retriever(SearchConfig::default());
//! let context = retriever.invoke("what does chapter 2 cover?").await?;
//! ```

pub mod local;
pub mod mmr;
pub mod retriever;

pub use local::LocalStore;
pub use mmr::{cosine_similarity, maximal_marginal_relevance};
pub use retriever::StoreRetriever;

use docchat_core::{Embedder, StoreError, VectorStore, VectorStoreBackend};
use std::path::PathBuf;
use std::sync::Arc;

/// Build the vector index for `backend`.
///
/// With a `persist_directory` the index is loaded from (and written to) that
/// directory; without one it lives in memory.
pub async fn create_vector_store(
    backend: VectorStoreBackend,
    persist_directory: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorStore>, StoreError> {
    match backend {
        VectorStoreBackend::Local => {
            let store = match persist_directory {
                Some(dir) => LocalStore::open(dir, embedder).await?,
                None => LocalStore::in_memory(embedder),
            };
            Ok(Arc::new(store))
        }
    }
}
