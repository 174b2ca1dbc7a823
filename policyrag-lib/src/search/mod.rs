//! Online retrieval
//!
//! [`Retriever`] reopens the persisted index per query, embeds the query
//! with the same provider used at ingestion, and returns the top-k chunks.
//!
//! Two surfaces are offered:
//! - [`Retriever::search`] / [`Retriever::context`] return typed results and
//!   propagate errors
//! - [`Retriever::retrieve`] always returns a string, turning every failure
//!   into a readable description, for callers such as an agent tool loop
//!   that must keep running across failed queries
//!
//! # Usage
//!
//! ```ignore
//! use policyrag_lib::search::{Retriever, DEFAULT_TOP_K};
//!
//! let retriever = Retriever::new(embedder, "data/vector_store");
//! let context = retriever.retrieve("How many casual leaves do I get?", DEFAULT_TOP_K).await;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::Settings;
use crate::embed::{self, Embedder};
use crate::store::{PersistentStore, SearchResult, VectorStore};
use crate::{Error, Result};

/// Number of chunks returned when the caller does not choose
pub const DEFAULT_TOP_K: usize = 3;

/// Returned by [`Retriever::retrieve`] when nothing matched
pub const NO_MATCH: &str = "No relevant policy found.";

/// Placed between chunks in a context string
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Successful retrieval result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Ranked chunk texts joined by [`CONTEXT_SEPARATOR`]
    Context(String),
    /// The search returned no chunks
    NoMatch,
}

impl RetrievalOutcome {
    pub fn into_text(self) -> String {
        match self {
            Self::Context(text) => text,
            Self::NoMatch => NO_MATCH.to_string(),
        }
    }
}

/// Read-only query engine over a persisted store.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store_dir: PathBuf,
}

impl Retriever {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            store_dir: store_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = embed::from_settings(&settings.embedding)?;
        Ok(Self::new(embedder, &settings.store_dir))
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Top-k chunks for `query`, most similar first.
    ///
    /// A blank query, or an empty store, yields no results without calling
    /// the provider. A missing store is [`Error::StoreNotFound`].
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".to_string()));
        }

        let store = PersistentStore::open(&self.store_dir).await?;
        store.check_compatible(self.embedder.model_name(), self.embedder.dimension())?;

        if query.trim().is_empty() || store.is_empty() {
            debug!(records = store.len(), "nothing to search");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        let results = store.search(&query_embedding, k)?;
        debug!(k, results = results.len(), "similarity search done");
        Ok(results)
    }

    /// Ranked chunk texts for `query` joined into a single context string.
    pub async fn context(&self, query: &str, k: usize) -> Result<RetrievalOutcome> {
        let results = self.search(query, k).await?;
        if results.is_empty() {
            return Ok(RetrievalOutcome::NoMatch);
        }

        let context = results
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        Ok(RetrievalOutcome::Context(context))
    }

    /// Context string for `query`; never fails.
    ///
    /// Returns [`NO_MATCH`] when nothing matched and
    /// `"Error searching policy: <cause>"` when anything went wrong.
    pub async fn retrieve(&self, query: &str, k: usize) -> String {
        info!(query, k, "searching policy");
        match self.context(query, k).await {
            Ok(outcome) => outcome.into_text(),
            Err(e) => {
                error!(error = %e, "policy search failed");
                error_text(&e)
            }
        }
    }
}

/// Text returned in place of a context when retrieval fails.
pub fn error_text(error: &Error) -> String {
    format!("Error searching policy: {error}")
}
