//! Document chunking strategies for docchat.
//!
//! - [`FixedSizeChunker`]: character windows with overlap, snapped to natural breaks
//! - [`SemanticChunker`]: sentence groups split at embedding-distance breakpoints
//! - [`Segmenter`]: the configured strategy, applied across a document's pages

pub mod fixed;
pub mod segmenter;
pub mod semantic;

pub use fixed::FixedSizeChunker;
pub use segmenter::Segmenter;
pub use semantic::SemanticChunker;
