//! Pipeline configuration.
//!
//! Settings come from an optional TOML file, then environment overrides.
//! Every field has a default so an empty file (or no file) is valid.
//!
//! ```toml
//! documents_dir = "data/policies"
//! store_dir = "data/vector_store"
//!
//! [chunking]
//! strategy = "recursive"
//! chunk_size = 1000
//! overlap = 100
//!
//! [embedding]
//! provider = "gemini"
//! model = "text-embedding-004"
//! batch_size = 100
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "policyrag.toml";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// File extensions eligible for ingestion (without the dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub chunking: ChunkingSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

fn default_documents_dir() -> PathBuf { PathBuf::from("data/policies") }
fn default_store_dir() -> PathBuf { PathBuf::from("data/vector_store") }
fn default_extensions() -> Vec<String> { vec!["pdf".into(), "txt".into(), "md".into()] }

impl Default for Settings {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            store_dir: default_store_dir(),
            extensions: default_extensions(),
            chunking: ChunkingSettings::default(),
            embedding: EmbeddingSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from(default)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from a specific TOML file, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("failed to parse config: {e}")))
    }

    /// Overlay values from the environment, read through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("POLICYRAG_DOCUMENTS_DIR") {
            self.documents_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("POLICYRAG_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(provider) = var("POLICYRAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        // an explicit key in the file wins over the environment
        if self.embedding.api_key.trim().is_empty() {
            if let Some(key) = var("GOOGLE_API_KEY") {
                self.embedding.api_key = key;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Recursive,
    Fixed,
}

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_strategy")]
    pub strategy: ChunkingStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_strategy() -> ChunkingStrategy { ChunkingStrategy::Recursive }
fn default_chunk_size() -> usize { 1000 }
fn default_overlap() -> usize { 100 }

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// One of "gemini", "bge" or "hashing"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Output dimension for providers that let it vary
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_provider() -> String { "gemini".into() }
fn default_model() -> String { "text-embedding-004".into() }
fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_batch_size() -> usize { 100 }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_retries() -> usize { 3 }

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            base_url: default_base_url(),
            dimension: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize { crate::search::DEFAULT_TOP_K }

impl Default for SearchSettings {
    fn default() -> Self {
        Self { top_k: default_top_k() }
    }
}
