//! Ingestion pipeline: load -> segment -> tag -> insert.

use async_trait::async_trait;
use docchat_chunker::Segmenter;
use docchat_core::{
    DocumentLoader, IngestError, META_DOCUMENT_TYPE, META_SOURCE, META_SOURCE_FILE, VectorStore,
};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Value recorded under `document_type` for every ingested chunk.
pub const DOCUMENT_TYPE_PDF: &str = "pdf";

/// Ingestion events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestUpdate {
    Started { source: String },
    Ingested { source: String, chunk_count: usize },
    Empty { source: String },
    Failed { source: String, error: String },
}

/// An uploaded file that can be read exactly once.
#[async_trait]
pub trait UploadHandle: Send + Sync {
    /// Client-supplied filename, if any.
    fn filename(&self) -> Option<&str>;

    /// Read the full upload body.
    async fn read_all(&self) -> std::io::Result<Vec<u8>>;
}

/// Something to ingest.
pub enum IngestInput {
    /// A PDF already on disk
    Path(PathBuf),
    /// PDF bytes held in memory
    Bytes {
        data: Vec<u8>,
        filename: Option<String>,
    },
    /// An upload read on demand
    Upload(Box<dyn UploadHandle>),
}

impl IngestInput {
    /// Original filename, if the input carries one.
    fn filename(&self) -> Option<String> {
        let name = match self {
            Self::Path(path) => path.file_name()?.to_str()?,
            Self::Bytes { filename, .. } => filename.as_deref()?,
            Self::Upload(handle) => handle.filename()?,
        };
        // Never trust directory components from clients
        Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
    }

    /// Stable identifier recorded as each chunk's `source_file`.
    fn source_id(&self) -> String {
        self.filename()
            .unwrap_or_else(|| format!("upload-{}.pdf", Uuid::new_v4()))
    }
}

impl From<PathBuf> for IngestInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for IngestInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes { data, filename } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("filename", filename)
                .finish(),
            Self::Upload(handle) => f
                .debug_struct("Upload")
                .field("filename", &handle.filename())
                .finish(),
        }
    }
}

/// Pipeline stage, for logs.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Intake,
    Load,
    Segment,
    Insert,
}

impl Stage {
    fn of(error: &IngestError) -> Self {
        match error {
            IngestError::UnsupportedInput(_) | IngestError::Io(_) => Self::Intake,
            IngestError::Load(_) => Self::Load,
            IngestError::Segment(_) => Self::Segment,
            IngestError::Insert(_) => Self::Insert,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Intake => "intake",
            Self::Load => "load",
            Self::Segment => "segment",
            Self::Insert => "insert",
        };
        f.write_str(name)
    }
}

/// Render an error with all of its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // Transparent wrappers already print their source
        if !message.ends_with(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/// Turns PDFs into indexed chunks.
///
/// Every failure is logged and returned as an [`IngestError`]; the index is
/// never left with part of a document.
pub struct IndexBuilder {
    loader: Arc<dyn DocumentLoader>,
    segmenter: Arc<Segmenter>,
    store: Arc<dyn VectorStore>,
    /// Where non-path inputs are spooled; the system temp dir if unset
    temp_dir: Option<PathBuf>,
    update_tx: broadcast::Sender<IngestUpdate>,
}

impl IndexBuilder {
    /// Create a new index builder.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        segmenter: Arc<Segmenter>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            loader,
            segmenter,
            store,
            temp_dir: None,
            update_tx,
        }
    }

    /// Spool in-memory inputs under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Subscribe to ingestion updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestUpdate> {
        self.update_tx.subscribe()
    }

    /// The index this builder writes to.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Ingest one PDF. Returns the number of chunks inserted.
    ///
    /// A document that yields no text is not an error: it is logged and
    /// reported as `Ok(0)`.
    pub async fn ingest(&self, input: IngestInput) -> Result<usize, IngestError> {
        let source = input.source_id();
        let _ = self.update_tx.send(IngestUpdate::Started {
            source: source.clone(),
        });

        match self.run(input, &source).await {
            Ok(0) => {
                warn!("No text extracted from {}, nothing indexed", source);
                let _ = self.update_tx.send(IngestUpdate::Empty { source });
                Ok(0)
            }
            Ok(chunk_count) => {
                info!("Indexed {} ({} chunks)", source, chunk_count);
                let _ = self.update_tx.send(IngestUpdate::Ingested {
                    source,
                    chunk_count,
                });
                Ok(chunk_count)
            }
            Err(e) => {
                let chain = error_chain(&e);
                error!(
                    "Failed to ingest {} at {} stage: {}",
                    source,
                    Stage::of(&e),
                    chain
                );
                let _ = self.update_tx.send(IngestUpdate::Failed {
                    source,
                    error: chain,
                });
                Err(e)
            }
        }
    }

    async fn run(&self, input: IngestInput, source: &str) -> Result<usize, IngestError> {
        // `_spool` deletes the temp file when it goes out of scope
        let (path, origin, _spool) = match input {
            IngestInput::Path(path) => {
                let metadata = tokio::fs::metadata(&path).await?;
                if !metadata.is_file() {
                    return Err(IngestError::UnsupportedInput(format!(
                        "{} is not a regular file",
                        path.display()
                    )));
                }
                let origin = path.to_string_lossy().into_owned();
                (path, origin, None)
            }
            IngestInput::Bytes { data, .. } => {
                let spool = self.spool(data).await?;
                (spool.path().to_path_buf(), source.to_string(), Some(spool))
            }
            IngestInput::Upload(handle) => {
                let data = handle.read_all().await.map_err(|e| {
                    IngestError::UnsupportedInput(format!("failed to read upload: {e}"))
                })?;
                let spool = self.spool(data).await?;
                (spool.path().to_path_buf(), source.to_string(), Some(spool))
            }
        };

        debug!("Loading {} from {:?} with {}", source, path, self.loader.name());
        let documents = self.loader.load(&path).await?;

        let mut chunks = self.segmenter.segment(&documents).await?;
        drop(documents);

        if chunks.is_empty() {
            return Ok(0);
        }

        for chunk in &mut chunks {
            chunk.metadata.insert(META_SOURCE_FILE.to_string(), source.into());
            chunk
                .metadata
                .insert(META_DOCUMENT_TYPE.to_string(), DOCUMENT_TYPE_PDF.into());
            // Spool paths are random; keep the record stable across re-ingests
            chunk.metadata.insert(META_SOURCE.to_string(), origin.as_str().into());
        }

        debug!("Inserting {} chunks from {}", chunks.len(), source);
        Ok(self.store.add_documents(chunks).await?)
    }

    /// Write `data` to a scoped `.pdf` temp file.
    async fn spool(&self, data: Vec<u8>) -> Result<NamedTempFile, IngestError> {
        let temp_dir = self.temp_dir.clone();
        let spool = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("docchat-").suffix(".pdf");
            let mut file = match temp_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&data)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(format!("spool task failed: {e}"))))??;

        Ok(spool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_chunker::FixedSizeChunker;
    use docchat_core::{
        Document, EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput, ExtractError,
    };
    use docchat_embed::NoopEmbedder;
    use docchat_extract::PdfLoader;
    use docchat_store::LocalStore;
    use tempfile::tempdir;

    /// Treats files as plain text with form feeds between pages.
    struct TextLoader;

    #[async_trait]
    impl DocumentLoader for TextLoader {
        fn name(&self) -> &str {
            "text"
        }

        async fn load(&self, path: &Path) -> Result<Vec<Document>, ExtractError> {
            let text = tokio::fs::read_to_string(path).await?;
            if text.is_empty() {
                return Err(ExtractError::Empty);
            }
            Ok(text
                .split('\x0C')
                .enumerate()
                .filter(|(_, page)| !page.trim().is_empty())
                .map(|(i, page)| Document::new(page).with_metadata("page", i))
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn max_tokens(&self) -> usize {
            512
        }

        async fn embed_text(
            &self,
            _texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            Err(EmbedError::Inference("model offline".to_string()))
        }
    }

    struct MemoryUpload {
        name: Option<String>,
        data: std::io::Result<Vec<u8>>,
    }

    #[async_trait]
    impl UploadHandle for MemoryUpload {
        fn filename(&self) -> Option<&str> {
            self.name.as_deref()
        }

        async fn read_all(&self) -> std::io::Result<Vec<u8>> {
            match &self.data {
                Ok(data) => Ok(data.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn segmenter() -> Arc<Segmenter> {
        Arc::new(Segmenter::Fixed(FixedSizeChunker::new(100, 20)))
    }

    fn builder(loader: Arc<dyn DocumentLoader>, store: LocalStore, spool: &Path) -> IndexBuilder {
        IndexBuilder::new(loader, segmenter(), Arc::new(store)).with_temp_dir(spool)
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_source_id_prefers_filename() {
        let input = IngestInput::Path(PathBuf::from("/docs/syllabus.pdf"));
        assert_eq!(input.source_id(), "syllabus.pdf");

        let input = IngestInput::Bytes {
            data: vec![],
            filename: Some("../../etc/notes.pdf".to_string()),
        };
        assert_eq!(input.source_id(), "notes.pdf");
    }

    #[test]
    fn test_source_id_generated() {
        let input = IngestInput::Bytes {
            data: vec![],
            filename: None,
        };
        let id = input.source_id();
        assert!(id.starts_with("upload-"));
        assert!(id.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn test_ingest_bytes_tags_chunks() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());

        let text = format!("{}\x0C{}", "first page text. ".repeat(5), "second page.");
        let count = builder
            .ingest(IngestInput::Bytes {
                data: text.into_bytes(),
                filename: Some("course.pdf".to_string()),
            })
            .await
            .unwrap();

        assert!(count >= 2);
        assert_eq!(store.len().await, count);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_sources, 1);
        assert!(is_empty_dir(spool.path()), "spool file must be removed");
    }

    #[tokio::test]
    async fn test_ingest_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "some lecture notes").unwrap();

        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), dir.path());
        let mut updates = builder.subscribe();

        let count = builder.ingest(IngestInput::Path(path)).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            updates.recv().await.unwrap(),
            IngestUpdate::Started {
                source: "notes.pdf".to_string()
            }
        );
        assert_eq!(
            updates.recv().await.unwrap(),
            IngestUpdate::Ingested {
                source: "notes.pdf".to_string(),
                chunk_count: 1
            }
        );
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());

        for _ in 0..2 {
            builder
                .ingest(IngestInput::Bytes {
                    data: b"the same document".to_vec(),
                    filename: Some("same.pdf".to_string()),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_upload() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());

        let upload = MemoryUpload {
            name: Some("upload.pdf".to_string()),
            data: Ok(b"uploaded content".to_vec()),
        };
        let count = builder
            .ingest(IngestInput::Upload(Box::new(upload)))
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert!(is_empty_dir(spool.path()));
    }

    #[tokio::test]
    async fn test_failed_upload_read() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());

        let upload = MemoryUpload {
            name: None,
            data: Err(std::io::Error::other("connection reset")),
        };
        let err = builder
            .ingest(IngestInput::Upload(Box::new(upload)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedInput(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_and_non_pdf_bytes_leave_index_unchanged() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(PdfLoader::new()), store.clone(), spool.path());
        let mut updates = builder.subscribe();

        for data in [Vec::new(), b"plain text, not a pdf".to_vec()] {
            let err = builder
                .ingest(IngestInput::Bytes {
                    data,
                    filename: Some("bad.pdf".to_string()),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::Load(_)));
        }

        assert!(store.is_empty().await);
        assert!(is_empty_dir(spool.path()), "spool file must be removed on failure");

        assert!(matches!(updates.recv().await.unwrap(), IngestUpdate::Started { .. }));
        assert!(matches!(updates.recv().await.unwrap(), IngestUpdate::Failed { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_unsupported() {
        let dir = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store, dir.path());

        let err = builder
            .ingest(IngestInput::Path(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedInput(_)));
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let dir = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store, dir.path());

        let err = builder
            .ingest(IngestInput::Path(dir.path().join("missing.pdf")))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }

    #[tokio::test]
    async fn test_blank_document_is_empty_not_error() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(NoopEmbedder::new()));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());
        let mut updates = builder.subscribe();

        let count = builder
            .ingest(IngestInput::Bytes {
                data: b"   \x0C  ".to_vec(),
                filename: Some("blank.pdf".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
        updates.recv().await.unwrap();
        assert_eq!(
            updates.recv().await.unwrap(),
            IngestUpdate::Empty {
                source: "blank.pdf".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_insert_failure_is_reported() {
        let spool = tempdir().unwrap();
        let store = LocalStore::in_memory(Arc::new(FailingEmbedder));
        let builder = builder(Arc::new(TextLoader), store.clone(), spool.path());

        let err = builder
            .ingest(IngestInput::Bytes {
                data: b"content that cannot be embedded".to_vec(),
                filename: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Insert(_)));
        assert!(store.is_empty().await);
        assert!(is_empty_dir(spool.path()));
    }

    #[test]
    fn test_error_chain() {
        let err = IngestError::Load(ExtractError::Empty);
        assert_eq!(error_chain(&err), "load failed: empty document");

        let err = IngestError::Io(std::io::Error::other("disk full"));
        assert_eq!(error_chain(&err), "io error: disk full");
    }
}
