//! Content-addressed local vector index.
//!
//! Records live in memory behind a `tokio` `RwLock`. When opened on a
//! directory, every successful write also rewrites an `index.json` snapshot
//! atomically (temp file in the same directory, then rename), so the durable
//! copy never holds a partial insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docchat_core::{
    Chunk, Embedder, EmbeddingConfig, Retriever, SearchConfig, SearchHit, SearchResults,
    StoreError, StoreStats, VectorRecord, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::mmr::cosine_similarity;
use crate::retriever::StoreRetriever;

/// File name of the durable snapshot inside the persist directory.
pub const SNAPSHOT_FILE: &str = "index.json";

/// Default k for [`VectorStore::retrieve`].
pub const DEFAULT_TOP_K: usize = 6;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot layout.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    embedding_model: String,
    updated_at: Option<DateTime<Utc>>,
    records: Vec<VectorRecord>,
}

/// In-memory index contents.
#[derive(Debug, Clone, Default)]
struct IndexState {
    /// Records in first-insertion order
    records: Vec<VectorRecord>,
    /// Record id -> position in `records`
    positions: HashMap<String, usize>,
    updated_at: Option<DateTime<Utc>>,
}

impl IndexState {
    fn from_records(records: Vec<VectorRecord>, updated_at: Option<DateTime<Utc>>) -> Self {
        let mut state = Self {
            updated_at,
            ..Self::default()
        };
        for record in records {
            state.upsert(record);
        }
        state
    }

    /// Insert, or replace a record with the same id in place.
    fn upsert(&mut self, record: VectorRecord) {
        match self.positions.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

/// Local vector index backed by an optional JSON snapshot.
///
/// Cloning is cheap and clones share the same records.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_store::LocalStore;
/// use docchat_core::VectorStore;
///
/// let store = LocalStore::open(".docchat/index", embedder).await?;
/// store.add_documents(chunks).await?;
/// let top = store.retrieve("what is the grading policy?").await?;
/// ```
#[derive(Clone)]
pub struct LocalStore {
    embedder: Arc<dyn Embedder>,
    embed_config: EmbeddingConfig,
    default_k: usize,
    dir: Option<PathBuf>,
    state: Arc<RwLock<IndexState>>,
}

impl LocalStore {
    /// Create an index that lives only in memory.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            embed_config: EmbeddingConfig::default(),
            default_k: DEFAULT_TOP_K,
            dir: None,
            state: Arc::new(RwLock::new(IndexState::default())),
        }
    }

    /// Open (or create) an index persisted under `dir`.
    ///
    /// Fails with [`StoreError::Dimension`] when the snapshot was built with
    /// an embedder of a different dimension.
    pub async fn open(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Init(format!("cannot create {}: {e}", dir.display())))?;

        let store = Self {
            dir: Some(dir),
            ..Self::in_memory(embedder)
        };
        let state = store.load_snapshot().await?;
        info!(
            "Opened local index at {:?} ({} records)",
            store.dir,
            state.records.len()
        );
        *store.state.write().await = state;
        Ok(store)
    }

    /// Override the k used by [`VectorStore::retrieve`].
    #[must_use]
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    /// Path of the snapshot file, if this index is persisted.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(SNAPSHOT_FILE))
    }

    /// Read the snapshot from disk; a missing file is an empty index.
    async fn load_snapshot(&self) -> Result<IndexState, StoreError> {
        let Some(path) = self.snapshot_path() else {
            return Ok(IndexState::default());
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {:?}, starting empty", path);
                return Ok(IndexState::default());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let dimension = self.embedder.dimension();
        if snapshot.dimension != dimension {
            return Err(StoreError::Dimension {
                expected: snapshot.dimension,
                actual: dimension,
            });
        }
        if snapshot.embedding_model != self.embedder.model_name() {
            warn!(
                "Index at {:?} was built with {}, querying with {}; rebuild the index for meaningful results",
                path,
                snapshot.embedding_model,
                self.embedder.model_name()
            );
        }

        Ok(IndexState::from_records(snapshot.records, snapshot.updated_at))
    }

    /// Atomically replace the snapshot with `state`.
    async fn write_snapshot(&self, state: &IndexState) -> Result<(), StoreError> {
        let (Some(dir), Some(path)) = (self.dir.clone(), self.snapshot_path()) else {
            return Ok(());
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.embedder.dimension(),
            embedding_model: self.embedder.model_name().to_string(),
            updated_at: state.updated_at,
            records: state.records.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes))
            .await
            .map_err(|e| StoreError::Persist(format!("snapshot task failed: {e}")))?
    }

    fn rank(&self, state: &IndexState, query_embedding: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, &VectorRecord)> = state
            .records
            .iter()
            .map(|record| (cosine_similarity(query_embedding, &record.embedding), record))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(score, record)| SearchHit {
                chunk: record.chunk.clone(),
                embedding: record.embedding.clone(),
                score,
            })
            .collect()
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| StoreError::Persist(format!("cannot replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[async_trait]
impl VectorStore for LocalStore {
    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let outputs = self.embedder.embed_text(&texts, &self.embed_config).await?;
        if outputs.len() != chunks.len() {
            return Err(StoreError::Insert(format!(
                "embedder returned {} vectors for {} chunks",
                outputs.len(),
                chunks.len()
            )));
        }

        let dimension = self.dimension();
        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, output) in chunks.into_iter().zip(outputs) {
            if output.embedding.len() != dimension {
                return Err(StoreError::Dimension {
                    expected: dimension,
                    actual: output.embedding.len(),
                });
            }
            records.push(VectorRecord {
                id: chunk.content_id(),
                chunk,
                embedding: output.embedding,
            });
        }
        let inserted = records.len();

        // Durable write first; memory is only updated once it succeeds
        let mut state = self.state.write().await;
        let mut next = state.clone();
        for record in records {
            next.upsert(record);
        }
        next.updated_at = Some(Utc::now());
        self.write_snapshot(&next).await?;

        debug!(
            "Inserted {} chunks ({} -> {} records)",
            inserted,
            state.records.len(),
            next.records.len()
        );
        *state = next;
        Ok(inserted)
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, StoreError> {
        let results = self.similarity_search(query, self.default_k).await?;
        Ok(results.hits.into_iter().map(|hit| hit.chunk).collect())
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<SearchResults, StoreError> {
        let query_embedding = self
            .embedder
            .embed_query(query, &self.embed_config)
            .await?
            .embedding;

        let state = self.state.read().await;
        let hits = self.rank(&state, &query_embedding, k);
        debug!("Similarity search returned {} of {} records", hits.len(), state.records.len());

        Ok(SearchResults {
            query_embedding,
            hits,
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        if self.dir.is_none() {
            return Ok(());
        }
        let reloaded = self.load_snapshot().await?;
        info!("Reloaded index from disk ({} records)", reloaded.records.len());
        *self.state.write().await = reloaded;
        Ok(())
    }

    fn as_retriever(&self, config: SearchConfig) -> Arc<dyn Retriever> {
        Arc::new(StoreRetriever::new(Arc::new(self.clone()), config))
    }

    async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        let sources: HashSet<&str> = state
            .records
            .iter()
            .filter_map(|r| r.chunk.source_file())
            .collect();

        Ok(StoreStats {
            total_records: state.records.len() as u64,
            total_sources: sources.len() as u64,
            dimension: self.dimension(),
            embedding_model: self.embedder.model_name().to_string(),
            last_updated: state.updated_at,
        })
    }
}
