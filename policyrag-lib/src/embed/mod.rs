//! Text embedding providers
//!
//! Three providers share the [`Embedder`] trait:
//!
//! - [`GeminiEmbedder`]: Google `text-embedding-004` over HTTPS (768 dims),
//!   needs an API key
//! - [`BgeEmbedder`]: BAAI/bge-large-en-v1.5 run locally via fastembed
//!   (1024 dims)
//! - [`HashingEmbedder`]: deterministic bag-of-words hashing, no model and no
//!   network, for offline runs and tests
//!
//! A store must be queried with the same provider and model it was built
//! with; see [`crate::store::Manifest`].
//!
//! # Usage
//!
//! ```ignore
//! use policyrag_lib::embed::{self, Embedder};
//!
//! let embedder = embed::from_settings(&settings.embedding)?;
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["Casual leave...", "Sick leave..."]).await?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("How many casual leaves do I get?").await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingSettings;
use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed multiple documents for indexing
    ///
    /// Returns one embedding per input, in input order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    ///
    /// Note: Some models (like BGE) use different prompts for queries vs documents.
    /// This method handles that distinction.
    async fn embed_query(&self, text: &str) -> Result<Embedding>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;

    /// Largest number of texts worth sending in one `embed_documents` call
    fn max_batch_size(&self) -> usize {
        64
    }
}

/// Build the configured provider.
///
/// Fails with [`Error::Configuration`] for an unknown provider name or a
/// provider missing its credential.
pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider.trim().to_ascii_lowercase().as_str() {
        "gemini" | "google" => Ok(Arc::new(GeminiEmbedder::from_settings(settings)?)),
        "bge" | "local" => Ok(Arc::new(BgeEmbedder::new()?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            settings.dimension.unwrap_or(DEFAULT_HASHING_DIMENSION),
        ))),
        other => Err(Error::Configuration(format!(
            "unknown embedding provider '{other}' (expected gemini, bge or hashing)"
        ))),
    }
}

mod bge;
mod gemini;
mod hashing;

pub use bge::*;
pub use gemini::*;
pub use hashing::*;
pub(crate) use hashing::{fnv1a_extend, FNV_OFFSET};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let settings = EmbeddingSettings {
            provider: "word2vec".into(),
            ..EmbeddingSettings::default()
        };
        assert!(matches!(from_settings(&settings), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_gemini_without_key_fails_fast() {
        let settings = EmbeddingSettings::default();
        assert!(settings.api_key.is_empty());
        assert!(matches!(from_settings(&settings), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_hashing_uses_configured_dimension() {
        let settings = EmbeddingSettings {
            provider: "Hashing".into(),
            dimension: Some(128),
            ..EmbeddingSettings::default()
        };
        let embedder = from_settings(&settings).unwrap();
        assert_eq!(embedder.dimension(), 128);
    }
}
