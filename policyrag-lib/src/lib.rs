//! PolicyRAG - retrieval core for question answering over policy documents
//!
//! # Architecture
//!
//! ```text
//! Policies dir -> Loader -> Chunker -> Embedder -> PersistentStore
//!                                                       |
//! Query -> Embedder -> Retriever <----------------------+
//!                         |
//!                   Context string
//! ```
//!
//! Ingestion is an offline batch job that replaces the index at the store
//! location; retrieval reopens that index read-only for every query.
//!
//! # Example
//!
//! ```ignore
//! use policyrag_lib::{config::Settings, ingest::Ingestor, search::Retriever};
//!
//! let settings = Settings::load(None)?;
//!
//! // Build the index
//! let report = Ingestor::from_settings(&settings)?
//!     .ingest(&settings.documents_dir)
//!     .await?;
//!
//! // Query it
//! let retriever = Retriever::from_settings(&settings)?;
//! let context = retriever.retrieve("How many casual leaves do I get?", 3).await;
//! ```

pub mod chunk;
pub mod config;
pub mod document;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod search;
pub mod store;

pub use error::{Error, Result};
