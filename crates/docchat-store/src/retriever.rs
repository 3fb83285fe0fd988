//! Retriever over a vector store.

use async_trait::async_trait;
use docchat_core::{Chunk, RetrievalError, Retriever, SearchConfig, SearchType, VectorStore};
use std::sync::Arc;
use tracing::debug;

use crate::mmr::maximal_marginal_relevance;

/// Query-time adapter turning a [`VectorStore`] into a [`Retriever`].
///
/// In [`SearchType::Mmr`] mode it fetches `fetch_k` candidates by similarity
/// and re-ranks them to `k`, trading some relevance for diversity.
pub struct StoreRetriever {
    store: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl StoreRetriever {
    /// Create a retriever over `store`.
    pub fn new(store: Arc<dyn VectorStore>, config: SearchConfig) -> Self {
        Self { store, config }
    }

    /// Search settings in use.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

#[async_trait]
impl Retriever for StoreRetriever {
    async fn invoke(&self, query: &str) -> Result<Vec<Chunk>, RetrievalError> {
        let SearchConfig {
            search_type,
            k,
            fetch_k,
            lambda_mult,
        } = self.config;

        match search_type {
            SearchType::Similarity => {
                let results = self.store.similarity_search(query, k).await?;
                Ok(results.hits.into_iter().map(|hit| hit.chunk).collect())
            }
            SearchType::Mmr => {
                let results = self.store.similarity_search(query, fetch_k.max(k)).await?;
                let embeddings: Vec<&[f32]> =
                    results.hits.iter().map(|hit| hit.embedding.as_slice()).collect();
                let picks =
                    maximal_marginal_relevance(&results.query_embedding, &embeddings, lambda_mult, k);

                debug!(
                    "MMR picked {} of {} candidates: {:?}",
                    picks.len(),
                    results.hits.len(),
                    picks
                );

                let mut hits: Vec<Option<Chunk>> =
                    results.hits.into_iter().map(|hit| Some(hit.chunk)).collect();
                Ok(picks.into_iter().filter_map(|i| hits[i].take()).collect())
            }
        }
    }
}
