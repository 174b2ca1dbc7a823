use crate::chunk::Chunk;
use crate::embed::Embedding;
use crate::store::{cosine_similarity, IndexRecord, SearchResult, VectorStore};
use crate::{Error, Result};

/// In-memory vector store.
///
/// Records are kept in insertion order and searched by brute-force cosine
/// similarity. Policy corpora are small (thousands of chunks), so a linear
/// scan is fast enough and gives exact, reproducible rankings.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<IndexRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already embedded records, validating dimensions.
    pub fn from_records(records: Vec<IndexRecord>) -> Result<Self> {
        if let Some(first) = records.first() {
            let dim = first.embedding.len();
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != dim) {
                return Err(Error::Store(format!(
                    "record {} has dimension {}, expected {dim}",
                    bad.chunk.id,
                    bad.embedding.len()
                )));
            }
        }
        Ok(Self { records })
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Dimension of the stored embeddings, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.len())
    }
}

impl VectorStore for MemoryStore {
    fn insert(&mut self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::InvalidInput(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let expected = self
            .dimension()
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(dim) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
                return Err(Error::Store(format!(
                    "embedding has dimension {}, store holds dimension {dim}",
                    bad.len()
                )));
            }
        }

        self.records.extend(chunks.iter().zip(embeddings).map(|(chunk, embedding)| {
            IndexRecord {
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            }
        }));
        Ok(())
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>> {
        if let Some(dim) = self.dimension() {
            if query.len() != dim {
                return Err(Error::EmbeddingMismatch(format!(
                    "query has dimension {}, store holds dimension {dim}",
                    query.len()
                )));
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (i, cosine_similarity(query, &record.embedding)))
            .collect();

        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult {
                chunk: self.records[i].chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}
