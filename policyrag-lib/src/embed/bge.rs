use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::debug;

use crate::embed::{Embedder, Embedding};
use crate::{Error, Result};

/// BGE embedder using BAAI/bge-large-en-v1.5.
///
/// Uses fastembed for ONNX-based inference. This model produces 1024-dimensional
/// embeddings and supports up to 512 tokens per input. Inference runs on the
/// blocking thread pool so it never stalls the async runtime.
#[derive(Clone)]
pub struct BgeEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl BgeEmbedder {
    /// Create a new BGE embedder.
    ///
    /// Downloads the model on first use (~1.2GB).
    pub fn new() -> Result<Self> {
        let opts = InitOptions::new(EmbeddingModel::BGELargeENV15)
            .with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Arc::new(Mutex::new(model)),
            })
            .map_err(|e| Error::Embedding(e.to_string()))
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
    }
}

#[async_trait]
impl Embedder for BgeEmbedder {
    fn model_name(&self) -> &str {
        "BAAI/bge-large-en-v1.5"
    }

    fn dimension(&self) -> usize {
        1024
    }

    fn max_batch_size(&self) -> usize {
        256
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "embedding documents locally");
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        // BGE uses a special prompt prefix for queries to improve retrieval
        let query_text = format!("Represent this sentence for searching relevant passages: {text}");

        self.run(vec![query_text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }
}
