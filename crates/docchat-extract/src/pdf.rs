//! PDF document loader.
//!
//! Uses lopdf to extract text page by page, falling back to pdf-extract for
//! the whole document when lopdf yields nothing (unusual font encodings).

use async_trait::async_trait;
use docchat_core::{Document, DocumentLoader, ExtractError, META_PAGE, META_SOURCE};
use lopdf::Document as PdfDocument;
use std::path::Path;
use tracing::{debug, warn};

/// How far into the file the `%PDF-` header may appear.
const HEADER_SEARCH_LEN: usize = 1024;

/// Loader for PDF files. Produces one [`Document`] per non-blank page.
pub struct PdfLoader;

impl PdfLoader {
    /// Create a new PDF loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load a PDF held in memory. `source` is recorded in each page's metadata.
    pub async fn load_bytes(
        &self,
        bytes: Vec<u8>,
        source: &str,
    ) -> Result<Vec<Document>, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::Empty);
        }
        if !has_pdf_header(&bytes) {
            return Err(ExtractError::UnsupportedType(format!(
                "{source} is not a PDF document"
            )));
        }

        let pages = tokio::task::spawn_blocking(move || extract_pages(&bytes))
            .await
            .map_err(|e| ExtractError::Failed(format!("Task join error: {e}")))??;

        let documents: Vec<Document> = pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| {
                Document::new(text)
                    .with_metadata(META_PAGE, page)
                    .with_metadata(META_SOURCE, source)
            })
            .collect();

        debug!("Loaded {} non-blank pages from {}", documents.len(), source);
        Ok(documents)
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn load(&self, path: &Path) -> Result<Vec<Document>, ExtractError> {
        debug!("Loading PDF: {:?}", path);
        let bytes = tokio::fs::read(path).await?;
        self.load_bytes(bytes, &path.to_string_lossy()).await
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_LEN)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Extract text for each page, in page order.
fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let doc = PdfDocument::load_mem(bytes)
        .map_err(|e| ExtractError::Parse(format!("Failed to parse PDF: {e}")))?;

    let mut pages = Vec::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                debug!("No text on page {}: {}", page_num, e);
                pages.push(String::new());
            }
        }
    }

    if pages.iter().all(|p| p.trim().is_empty()) {
        warn!("lopdf found no text, falling back to pdf-extract");
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Failed(format!("PDF extraction failed: {e}")))?;
        return Ok(split_form_feeds(&text));
    }

    Ok(pages)
}

/// Split whole-document text into pages on form feed characters.
fn split_form_feeds(text: &str) -> Vec<String> {
    text.split('\x0C').map(str::to_string).collect()
}
