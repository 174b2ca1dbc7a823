use crate::chunk::{sliding_chunks, validate, Chunk, ChunkMetadata, Chunker};
use crate::Result;

/// Fixed-size chunker - splits by character count
///
/// Good for: baseline experiments, consistent chunk sizes
///
/// Parameters to consider:
/// - chunk_size: target size in characters
/// - overlap: how much overlap between adjacent chunks
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) unless
    /// `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate(chunk_size, overlap)?;
        Ok(Self { chunk_size, overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn overlap(&self) -> usize {
        self.overlap
    }

    fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk> {
        // every window is cut at exactly chunk_size chars, so the stride is
        // chunk_size - overlap and the last window stops at the end of content
        sliding_chunks(content, self.chunk_size, self.overlap, metadata, |_, _, hard_end| {
            hard_end
        })
    }
}
