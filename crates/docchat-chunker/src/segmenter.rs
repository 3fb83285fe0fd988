//! Strategy selection for document segmentation.

use docchat_core::{
    Chunk, ChunkConfig, ChunkError, ChunkStrategy, Chunker, ConfigError, Document, Embedder,
};
use std::sync::Arc;
use tracing::debug;

use crate::fixed::FixedSizeChunker;
use crate::semantic::SemanticChunker;

/// The configured chunking strategy.
pub enum Segmenter {
    Fixed(FixedSizeChunker),
    Semantic(SemanticChunker),
}

impl Segmenter {
    /// Build the strategy named in `config`.
    ///
    /// The embedder is only used by the semantic strategy. Window bounds are
    /// validated for both, so a bad configuration fails here rather than at
    /// first ingest.
    pub fn from_config(
        config: &ChunkConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        match config.strategy {
            ChunkStrategy::Fixed => Ok(Self::Fixed(FixedSizeChunker::from_config(config)?)),
            ChunkStrategy::Semantic => Ok(Self::Semantic(SemanticChunker::from_config(
                embedder, config,
            )?)),
        }
    }

    fn chunker(&self) -> &dyn Chunker {
        match self {
            Self::Fixed(chunker) => chunker,
            Self::Semantic(chunker) => chunker,
        }
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn name(&self) -> &str {
        self.chunker().name()
    }

    /// Segment documents in order. Each document is chunked independently.
    pub async fn segment(&self, documents: &[Document]) -> Result<Vec<Chunk>, ChunkError> {
        let chunker = self.chunker();
        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(chunker.chunk(document).await?);
        }
        debug!(
            "{} produced {} chunks from {} documents",
            chunker.name(),
            chunks.len(),
            documents.len()
        );
        Ok(chunks)
    }
}
