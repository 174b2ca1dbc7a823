//! Document chunking strategies
//!
//! Every strategy honours the same contract:
//! - deterministic for a given input and configuration
//! - no chunk is longer than `chunk_size` characters
//! - adjacent chunks repeat exactly `overlap` characters of literal text
//! - dropping each chunk's leading overlap and concatenating the rest gives
//!   back the original text
//!
//! Lengths are counted in characters (Unicode scalar values), never bytes.
//!
//! # Implementing a Chunker
//!
//! ```ignore
//! use policyrag_lib::chunk::{Chunker, Chunk, ChunkMetadata};
//!
//! struct MyChunker { /* ... */ }
//!
//! impl Chunker for MyChunker {
//!     fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk> {
//!         // Your chunking logic here
//!         todo!()
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ChunkingSettings, ChunkingStrategy};
use crate::embed::{fnv1a_extend, FNV_OFFSET};
use crate::{Error, Result};

/// A chunk of text with its metadata
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Chunk {
    /// Stable identifier derived from source, sequence and content
    pub id: String,
    /// The text content of this chunk
    pub content: String,
    /// Metadata about the source and position
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChunkMetadata {
    /// Source document identifier (file name)
    pub source_id: String,
    /// 1-based page number for paged sources such as PDF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Position of the chunk within its document (0-indexed)
    pub sequence: usize,
    /// Character offset of the chunk within its page
    pub position: usize,
    /// Length of the chunk content in characters
    pub char_length: usize,
    /// Total number of chunks from this source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

/// Trait for document chunking strategies
pub trait Chunker: Send + Sync {
    /// Split content into chunks
    ///
    /// # Arguments
    /// * `content` - The text content to chunk
    /// * `metadata` - Base metadata to attach to each chunk
    ///
    /// # Returns
    /// Chunks in document order with `sequence`, `position` and
    /// `char_length` filled in
    fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk>;

    /// Returns the name of this chunking strategy
    fn name(&self) -> &str;

    /// Maximum chunk length in characters
    fn chunk_size(&self) -> usize;

    /// Characters shared by adjacent chunks
    fn overlap(&self) -> usize;
}

/// Build the configured chunker, validating size and overlap
pub fn from_settings(settings: &ChunkingSettings) -> Result<Box<dyn Chunker>> {
    let (size, overlap) = (settings.chunk_size, settings.overlap);
    let chunker: Box<dyn Chunker> = match settings.strategy {
        ChunkingStrategy::Recursive => Box::new(RecursiveChunker::new(size, overlap)?),
        ChunkingStrategy::Fixed => Box::new(FixedSizeChunker::new(size, overlap)?),
    };
    Ok(chunker)
}

fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::Configuration("chunk_size must be at least 1".into()));
    }
    if overlap >= chunk_size {
        return Err(Error::Configuration(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Byte offsets of every char boundary in `content`, including the end.
///
/// `bounds[i]` is where the i-th character starts, so a char range
/// `a..b` maps to the byte range `bounds[a]..bounds[b]`.
fn char_bounds(content: &str) -> Vec<usize> {
    content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect()
}

/// Walk `content` in windows, letting `pick_end` choose where each chunk stops.
///
/// `pick_end(start, hard_end)` must return an end in `start + overlap + 1..=hard_end`
/// so the walk always makes progress.
fn sliding_chunks<F>(
    content: &str,
    chunk_size: usize,
    overlap: usize,
    metadata: ChunkMetadata,
    pick_end: F,
) -> Vec<Chunk>
where
    F: Fn(&[usize], usize, usize) -> usize,
{
    if content.trim().is_empty() {
        return Vec::new();
    }

    let bounds = char_bounds(content);
    let total_chars = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + chunk_size).min(total_chars);
        let end = if hard_end == total_chars {
            total_chars
        } else {
            pick_end(&bounds, start, hard_end)
        };

        let text = &content[bounds[start]..bounds[end]];
        let mut m = metadata.clone();
        m.sequence = metadata.sequence + chunks.len();
        m.position = start;
        m.char_length = end - start;
        chunks.push(Chunk {
            id: generate_id(&m.source_id, m.page, m.sequence, text),
            content: text.to_string(),
            metadata: m,
        });

        if end == total_chars {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// FNV-1a over a fixed little-endian field encoding.
///
/// Ids are persisted in the index, so they must not depend on the toolchain
/// or the platform.
fn generate_id(source: &str, page: Option<usize>, sequence: usize, text: &str) -> String {
    let page = page.map_or(0, |p| p as u64 + 1).to_le_bytes();
    let sequence = (sequence as u64).to_le_bytes();
    let fields: [&[u8]; 5] = [source.as_bytes(), &[0xff], &page, &sequence, text.as_bytes()];
    let hash = fields
        .iter()
        .fold(FNV_OFFSET, |hash, field| fnv1a_extend(hash, field));
    format!("{hash:016x}")
}

mod fixed;
mod recursive;

pub use fixed::*;
pub use recursive::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let settings = ChunkingSettings {
            strategy: ChunkingStrategy::Recursive,
            chunk_size: 100,
            overlap: 100,
        };
        assert!(matches!(from_settings(&settings), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rejects_zero_size() {
        let settings = ChunkingSettings {
            strategy: ChunkingStrategy::Fixed,
            chunk_size: 0,
            overlap: 0,
        };
        assert!(matches!(from_settings(&settings), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_builds_configured_strategy() {
        let chunker = from_settings(&ChunkingSettings::default()).unwrap();
        assert_eq!(chunker.name(), "recursive");
        assert_eq!(chunker.chunk_size(), 1000);
        assert_eq!(chunker.overlap(), 100);

        let fixed = from_settings(&ChunkingSettings {
            strategy: ChunkingStrategy::Fixed,
            chunk_size: 50,
            overlap: 5,
        })
        .unwrap();
        assert_eq!(fixed.name(), "fixed");
    }

    #[test]
    fn test_ids_are_pinned() {
        assert_eq!(
            generate_id("leave.txt", Some(1), 3, "Casual leave: 12 days per year."),
            "06dec85289aede96"
        );
        assert_ne!(
            generate_id("leave.txt", None, 3, "Casual leave: 12 days per year."),
            generate_id("leave.txt", Some(0), 3, "Casual leave: 12 days per year.")
        );
    }

    #[test]
    fn test_char_bounds_multibyte() {
        let bounds = char_bounds("aé👋");
        assert_eq!(bounds, vec![0, 1, 3, 7]);
    }
}
