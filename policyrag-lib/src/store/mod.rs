//! Vector storage backends
//!
//! [`MemoryStore`] does the similarity search; [`PersistentStore`] wraps it
//! with an on-disk location, a manifest recording the embedding space, and
//! atomic replace-on-commit.
//!
//! # Storage Model
//!
//! Each stored item is an [`IndexRecord`]:
//! - Chunk: the original text and metadata
//! - Embedding: the vector representation
//!
//! # Usage
//!
//! ```ignore
//! use policyrag_lib::store::{Manifest, PersistentStore, VectorStore};
//!
//! // Ingestion: replace whatever was at the location
//! let mut store = PersistentStore::create_or_replace(dir, manifest).await?;
//! store.insert(&chunks, &embeddings)?;
//! store.commit().await?;
//!
//! // Retrieval: cheap read-only reopen
//! let store = PersistentStore::open(dir).await?;
//! let results = store.search(&query_embedding, 3)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::embed::Embedding;
use crate::Result;

/// A chunk together with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

/// A search result with similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// The matched chunk
    pub chunk: Chunk,
    /// Similarity score (higher is more similar)
    /// For cosine similarity: -1.0 to 1.0
    pub score: f32,
}

/// Trait for vector storage backends
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embeddings
    ///
    /// # Arguments
    /// * `chunks` - The text chunks to store
    /// * `embeddings` - Corresponding embeddings (must be same length)
    fn insert(&mut self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()>;

    /// Search for similar chunks
    ///
    /// # Arguments
    /// * `query_embedding` - The query vector
    /// * `k` - Number of results to return
    ///
    /// # Returns
    /// Top-k results sorted by similarity (highest first), equal scores in
    /// insertion order
    fn search(&self, query_embedding: &Embedding, k: usize) -> Result<Vec<SearchResult>>;

    /// Get total number of stored chunks
    fn len(&self) -> usize;

    /// Check if store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data
    fn clear(&mut self);
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction; zero vectors
/// score 0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

mod memory;
mod persistent;

pub use memory::*;
pub use persistent::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![0.3, 0.4];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
