//! PDF ingestion for docchat.
//!
//! This crate provides the pipeline that turns a PDF into indexed chunks:
//! load → segment → tag → insert.
//!
//! # Components
//!
//! - [`IndexBuilder`]: Runs the pipeline for one input at a time
//! - [`IngestInput`]: A path, in-memory bytes, or an [`UploadHandle`]
//! - [`IngestUpdate`]: Events emitted during ingestion
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_index::{IndexBuilder, IngestInput, IngestUpdate};
//!
//! let builder = IndexBuilder::new(loader, segmenter, store);
//!
//! // Subscribe to updates
//! let mut updates = builder.subscribe();
//!
//! let chunk_count = builder.ingest(IngestInput::Path("syllabus.pdf".into())).await?;
//!
//! while let Ok(update) = updates.try_recv() {
//!     match update {
//!         IngestUpdate::Ingested { source, chunk_count } => { /* ... */ }
//!         IngestUpdate::Failed { source, error } => { /* ... */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod builder;

pub use builder::{DOCUMENT_TYPE_PDF, IndexBuilder, IngestInput, IngestUpdate, UploadHandle};
