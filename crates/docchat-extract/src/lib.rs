//! PDF loading for docchat.
//!
//! [`PdfLoader`] implements [`DocumentLoader`](docchat_core::DocumentLoader)
//! and turns a PDF file or byte buffer into one document per non-blank page,
//! tagged with its 0-based `page` index and `source`.

pub mod pdf;

pub use pdf::PdfLoader;
