//! Offline ingestion pipeline
//!
//! Turns a directory of policy documents into a persisted vector index:
//!
//! ```text
//! dir -> discover -> load (per file, failures skipped)
//!     -> chunk (per page) -> embed (batched) -> PersistentStore (replace + commit)
//! ```
//!
//! A run either commits a complete new index or leaves the previous one in
//! place: embedding failures abort before anything is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::{self, Chunk, ChunkMetadata, Chunker};
use crate::config::Settings;
use crate::document::{self, Document};
use crate::embed::{self, Embedder, Embedding};
use crate::store::{Manifest, PersistentStore, VectorStore};
use crate::{Error, Result};

/// A source file that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents loaded successfully
    pub documents: usize,
    /// Chunks produced from those documents
    pub chunks: usize,
    /// Records written to the store (0 when nothing was committed)
    pub records: usize,
    /// Files that failed to load
    pub skipped: Vec<SkippedDocument>,
}

impl IngestReport {
    /// Whether this run replaced the index on disk
    pub fn committed(&self) -> bool {
        self.records > 0
    }
}

/// Ingestion pipeline with injected embedder and chunker
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    chunker: Box<dyn Chunker>,
    store_dir: PathBuf,
    extensions: Vec<String>,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chunker: Box<dyn Chunker>,
        store_dir: impl Into<PathBuf>,
    ) -> Self {
        let defaults = Settings::default();
        Self {
            embedder,
            chunker,
            store_dir: store_dir.into(),
            extensions: defaults.extensions,
            batch_size: defaults.embedding.batch_size,
        }
    }

    /// Build the pipeline from settings.
    ///
    /// The embedding provider and chunker are constructed here, so a missing
    /// credential or invalid chunk configuration fails before any work.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = embed::from_settings(&settings.embedding)?;
        let chunker = chunk::from_settings(&settings.chunking)?;
        Ok(Self::new(embedder, chunker, &settings.store_dir)
            .with_extensions(settings.extensions.clone())
            .with_batch_size(settings.embedding.batch_size))
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Ingest every eligible file in `source_dir`, replacing the store.
    ///
    /// Files that fail to load are logged and listed in the report. If no
    /// document yields any text the store is left untouched.
    pub async fn ingest(&self, source_dir: impl AsRef<Path>) -> Result<IngestReport> {
        let source_dir = source_dir.as_ref();
        info!(dir = %source_dir.display(), "loading policies");

        let mut report = IngestReport::default();
        let documents = self.load_documents(source_dir, &mut report).await?;
        report.documents = documents.len();

        if documents.is_empty() {
            warn!(dir = %source_dir.display(), "no eligible documents found, store left untouched");
            return Ok(report);
        }

        let chunks = self.chunk_documents(&documents);
        report.chunks = chunks.len();
        info!(documents = documents.len(), chunks = chunks.len(), "split documents into chunks");

        if chunks.is_empty() {
            warn!("documents contained no text, store left untouched");
            return Ok(report);
        }

        // claim the location before spending provider calls
        let manifest = Manifest::new(
            self.embedder.model_name(),
            self.embedder.dimension(),
            self.chunker.chunk_size(),
            self.chunker.overlap(),
        );
        let mut store = PersistentStore::create_or_replace(&self.store_dir, manifest).await?;

        let embeddings = self.embed_chunks(&chunks).await?;
        store.insert(&chunks, &embeddings)?;
        store.commit().await?;
        report.records = store.len();

        info!(
            documents = report.documents,
            records = report.records,
            skipped = report.skipped.len(),
            store = %self.store_dir.display(),
            "ingestion complete"
        );
        Ok(report)
    }

    async fn load_documents(
        &self,
        source_dir: &Path,
        report: &mut IngestReport,
    ) -> Result<Vec<Document>> {
        let files = document::discover(source_dir, &self.extensions)?;

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let task_path = path.clone();
            let loaded = tokio::task::spawn_blocking(move || document::load(&task_path))
                .await
                .unwrap_or_else(|e| {
                    Err(Error::DocumentLoad {
                        path: path.clone(),
                        reason: format!("loader task failed: {e}"),
                    })
                });

            match loaded {
                Ok(doc) => {
                    info!(file = %doc.source_id, pages = doc.pages.len(), "loaded document");
                    documents.push(doc);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping document");
                    let reason = match e {
                        Error::DocumentLoad { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    report.skipped.push(SkippedDocument { path, reason });
                }
            }
        }
        Ok(documents)
    }

    fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let mut doc_chunks: Vec<Chunk> = Vec::new();
            for page in &doc.pages {
                let base = ChunkMetadata {
                    source_id: doc.source_id.clone(),
                    page: page.number,
                    sequence: doc_chunks.len(),
                    ..ChunkMetadata::default()
                };
                doc_chunks.extend(self.chunker.chunk(&page.text, base));
            }

            let total = doc_chunks.len();
            for c in &mut doc_chunks {
                c.metadata.total_chunks = Some(total);
            }
            debug!(
                file = %doc.source_id,
                chunks = total,
                strategy = self.chunker.name(),
                "chunked document"
            );
            chunks.extend(doc_chunks);
        }
        chunks
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let batch_size = self.batch_size.min(self.embedder.max_batch_size()).max(1);
        info!(
            chunks = chunks.len(),
            batch_size,
            model = self.embedder.model_name(),
            "creating embeddings"
        );

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (i, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let batch_embeddings = self.embedder.embed_documents(&texts).await?;
            if batch_embeddings.len() != batch.len() {
                return Err(Error::Provider(format!(
                    "provider returned {} embeddings for a batch of {}",
                    batch_embeddings.len(),
                    batch.len()
                )));
            }
            debug!(batch = i, size = batch.len(), "embedded batch");
            embeddings.extend(batch_embeddings);
        }
        Ok(embeddings)
    }
}
