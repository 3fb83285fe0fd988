//! Integration tests for the full docchat pipeline.
//!
//! Tests the complete flow: PDF → pages → chunks → index → retrieval → answer.

use async_trait::async_trait;
use docchat_chat::{ConversationalPipeline, HistoryStore};
use docchat_chunker::{FixedSizeChunker, Segmenter};
use docchat_core::{
    ChatRequest, Chunk, ChunkConfig, Document, EmbedError, Embedder, EmbeddingConfig,
    EmbeddingOutput, GenerationError, IngestError, LanguageModel, Message, SearchConfig,
    SearchType, TokenStream, VectorStore, VectorStoreBackend,
};
use docchat_extract::PdfLoader;
use docchat_index::{IndexBuilder, IngestInput, UploadHandle};
use docchat_store::{LocalStore, create_vector_store};
use futures::{StreamExt, stream};
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const VOCAB: [&str; 10] = [
    "photosynthesis",
    "light",
    "energy",
    "exam",
    "friday",
    "grading",
    "homework",
    "chlorophyll",
    "syllabus",
    "office",
];

/// Mock embedder for testing (avoids model download).
///
/// One axis per vocabulary word, so similarities are easy to reason about.
struct VocabEmbedder;

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab-embedder"
    }

    fn dimension(&self) -> usize {
        VOCAB.len()
    }

    fn max_tokens(&self) -> usize {
        512
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        _config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = vec![0.0; VOCAB.len()];
                let words = text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase);
                for word in words {
                    if let Some(i) = VOCAB.iter().position(|v| *v == word) {
                        embedding[i] += 1.0;
                    }
                }
                EmbeddingOutput {
                    embedding,
                    token_count: text.split_whitespace().count(),
                }
            })
            .collect())
    }
}

/// Streams a fixed answer word by word and records every request.
struct ScriptedModel {
    name: String,
    answer: String,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(name: &str, answer: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.answer.clone())
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        let fragments: Vec<Result<String, GenerationError>> = self
            .answer
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// Backend that is always down.
struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Request("connection refused".to_string()))
    }
}

struct MemoryUpload {
    name: &'static str,
    data: Vec<u8>,
}

#[async_trait]
impl UploadHandle for MemoryUpload {
    fn filename(&self) -> Option<&str> {
        Some(self.name)
    }

    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// Build a PDF with one line of text per page.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn index_builder(store: Arc<dyn VectorStore>, spool: &Path) -> IndexBuilder {
    let segmenter = Segmenter::from_config(&ChunkConfig::default(), Arc::new(VocabEmbedder)).unwrap();
    IndexBuilder::new(Arc::new(PdfLoader::new()), Arc::new(segmenter), store).with_temp_dir(spool)
}

fn pdf_bytes(name: &str, pages: &[&str]) -> IngestInput {
    IngestInput::Bytes {
        data: build_pdf(pages),
        filename: Some(name.to_string()),
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

fn duplicates(chunks: &[Chunk]) -> usize {
    chunks
        .iter()
        .filter(|c| c.text.contains("photosynthesis light energy"))
        .count()
}

async fn answer(pipeline: &ConversationalPipeline, session: &str, question: &str) -> String {
    pipeline.converse(session, question).collect::<Vec<_>>().await.concat()
}

#[tokio::test]
async fn test_full_pipeline_ingest_retrieve_answer() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let builder = index_builder(store.clone(), dir.path());

    let count = builder
        .ingest(pdf_bytes(
            "syllabus.pdf",
            &[
                "The syllabus lists office hours on Tuesday",
                "The final exam is on Friday at noon",
            ],
        ))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(store.len().await, 2);

    let model = Arc::new(ScriptedModel::new("scripted", "The exam is on Friday."));
    let pipeline = ConversationalPipeline::new(
        store.as_retriever(SearchConfig::default()),
        model.clone(),
        Arc::new(HistoryStore::new()),
    );

    let reply = answer(&pipeline, "student", "When is the exam on friday?").await;
    assert_eq!(reply, "The exam is on Friday.");

    let request = &model.requests()[0];
    let context = &request.messages[1].content;
    assert!(context.starts_with("Relevant Context: [1] (source: syllabus.pdf, page 1)"));
    assert!(context.contains("final exam"));

    assert_eq!(
        pipeline.history("student").await,
        vec![
            Message::Human("When is the exam on friday?".to_string()),
            Message::Assistant("The exam is on Friday.".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_ingest_leaves_index_unchanged() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let builder = index_builder(store.clone(), dir.path());

    builder
        .ingest(pdf_bytes("notes.pdf", &["homework is due friday"]))
        .await
        .unwrap();
    let before = store.len().await;

    for data in [Vec::new(), b"GIF89a not a pdf at all".to_vec()] {
        let result = builder
            .ingest(IngestInput::Bytes {
                data,
                filename: Some("broken.pdf".to_string()),
            })
            .await;
        assert!(matches!(result, Err(IngestError::Load(_))));
        assert_eq!(store.len().await, before);
    }
}

#[tokio::test]
async fn test_temp_files_removed_after_ingest() {
    let spool = tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let builder = index_builder(store.clone(), spool.path());

    let upload = MemoryUpload {
        name: "upload.pdf",
        data: build_pdf(&["grading policy for homework"]),
    };
    builder
        .ingest(IngestInput::Upload(Box::new(upload)))
        .await
        .unwrap();
    assert!(is_empty_dir(spool.path()));

    let bad_upload = MemoryUpload {
        name: "bad.pdf",
        data: b"%PDF-1.4 truncated".to_vec(),
    };
    assert!(builder
        .ingest(IngestInput::Upload(Box::new(bad_upload)))
        .await
        .is_err());
    assert!(is_empty_dir(spool.path()));
}

#[tokio::test]
async fn test_history_append_atomicity() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    index_builder(store.clone(), dir.path())
        .ingest(pdf_bytes("notes.pdf", &["office hours are on friday"]))
        .await
        .unwrap();

    let pipeline = ConversationalPipeline::new(
        store.as_retriever(SearchConfig::default()),
        Arc::new(ScriptedModel::new("scripted", "On Friday.")),
        Arc::new(HistoryStore::new()),
    );

    for i in 0..3 {
        answer(&pipeline, "s", &format!("question {i} about office hours")).await;
    }
    let history = pipeline.history("s").await;
    assert_eq!(history.len(), 6);
    assert_eq!(history[4], Message::Human("question 2 about office hours".to_string()));

    pipeline.set_model(Arc::new(OfflineModel));
    let reply = answer(&pipeline, "s", "one more?").await;
    assert_eq!(
        reply,
        "Error generating response: request failed: connection refused"
    );
    assert_eq!(pipeline.history("s").await.len(), 6);
}

#[tokio::test]
async fn test_mmr_returns_fewer_duplicates() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let builder = index_builder(store.clone(), dir.path());

    for i in 0..5 {
        builder
            .ingest(pdf_bytes(&format!("copy{i}.pdf"), &["photosynthesis light energy"]))
            .await
            .unwrap();
    }
    for (name, text) in [
        ("leaf.pdf", "chlorophyll absorbs light"),
        ("dates.pdf", "exam on friday"),
        ("policy.pdf", "grading and homework"),
        ("review.pdf", "photosynthesis exam"),
    ] {
        builder.ingest(pdf_bytes(name, &[text])).await.unwrap();
    }
    assert_eq!(store.len().await, 9);

    let similarity = store.as_retriever(SearchConfig {
        search_type: SearchType::Similarity,
        ..SearchConfig::default()
    });
    let mmr = store.as_retriever(SearchConfig::default());

    let query = "photosynthesis exam friday";

    let plain = similarity.invoke(query).await.unwrap();
    let diverse = mmr.invoke(query).await.unwrap();

    assert_eq!(plain.len(), 6);
    assert_eq!(diverse.len(), 6);
    assert!(duplicates(&diverse) < duplicates(&plain));
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let pipeline = ConversationalPipeline::new(
        store.as_retriever(SearchConfig::default()),
        Arc::new(ScriptedModel::new("scripted", "ok")),
        Arc::new(HistoryStore::new()),
    );

    pipeline.clear_history("never-used").await;
    assert!(pipeline.history("never-used").await.is_empty());

    answer(&pipeline, "s", "hello").await;
    pipeline.clear_history("s").await;
    pipeline.clear_history("s").await;
    assert!(pipeline.history("s").await.is_empty());
}

#[tokio::test]
async fn test_model_swap_preserves_history() {
    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::in_memory(Arc::new(VocabEmbedder)));
    let first = Arc::new(ScriptedModel::new("first", "first answer"));
    let second = Arc::new(ScriptedModel::new("second", "second answer"));
    let pipeline = ConversationalPipeline::new(
        store.as_retriever(SearchConfig::default()),
        first,
        Arc::new(HistoryStore::new()),
    );

    answer(&pipeline, "s", "q1").await;
    answer(&pipeline, "s", "q2").await;
    pipeline.set_model(second.clone());
    answer(&pipeline, "s", "q3").await;

    let request = &second.requests()[0];
    let prior: Vec<&str> = request.messages[2..]
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        prior,
        vec!["q1", "first answer", "q2", "first answer", "q3"]
    );
}

#[tokio::test]
async fn test_fixed_segmentation_contract() {
    let segmenter = Segmenter::Fixed(FixedSizeChunker::from_config(&ChunkConfig::default()).unwrap());
    let text = "Grading is based on homework and two exams. ".repeat(60);
    let chunks = segmenter.segment(&[Document::new(text)]).await.unwrap();

    assert!(chunks.len() > 2);
    let starts: Vec<i64> = chunks
        .iter()
        .map(|c| c.metadata["start_char"].as_i64().unwrap())
        .collect();
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] <= 400);
    }
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 500));
}

#[tokio::test]
async fn test_persisted_index_round_trip() {
    let index_dir = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder);

    let store = create_vector_store(
        VectorStoreBackend::Local,
        Some(index_dir.path().to_path_buf()),
        embedder.clone(),
    )
    .await
    .unwrap();
    let builder = index_builder(store.clone(), spool.path());
    builder
        .ingest(pdf_bytes("syllabus.pdf", &["office hours", "exam friday"]))
        .await
        .unwrap();

    // Re-ingesting the same document is a no-op
    builder
        .ingest(pdf_bytes("syllabus.pdf", &["office hours", "exam friday"]))
        .await
        .unwrap();
    assert_eq!(store.len().await, 2);

    let reopened = create_vector_store(
        VectorStoreBackend::Local,
        Some(index_dir.path().to_path_buf()),
        embedder,
    )
    .await
    .unwrap();
    assert_eq!(reopened.len().await, 2);
    reopened.persist().await.unwrap();

    let top = reopened.retrieve("exam").await.unwrap();
    assert_eq!(top[0].source_file(), Some("syllabus.pdf"));
    assert_eq!(top[0].page(), Some(1));
}
