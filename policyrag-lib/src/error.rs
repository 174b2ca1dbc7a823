//! Error types for the retrieval pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting or retrieving
#[derive(Error, Debug)]
pub enum Error {
    /// A required credential or setting is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single source document could not be loaded
    #[error("failed to load document {}: {reason}", path.display())]
    DocumentLoad { path: PathBuf, reason: String },

    /// Retrieval was attempted against a store that was never created
    #[error("vector store not found at {}", .0.display())]
    StoreNotFound(PathBuf),

    /// Another ingestion currently owns the store location
    #[error("vector store at {} is locked by another ingestion", .0.display())]
    StoreLocked(PathBuf),

    /// The embedding provider was unreachable or returned an error
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// Failed to load or run a local embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Query embedding is not in the same space as the stored records
    #[error("embedding mismatch: {0}")]
    EmbeddingMismatch(String),

    /// Failed to store or retrieve from the vector store
    #[error("store error: {0}")]
    Store(String),

    /// Failed to chunk a document
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
