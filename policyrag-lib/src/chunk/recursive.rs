use crate::chunk::{sliding_chunks, validate, Chunk, ChunkMetadata, Chunker};
use crate::Result;

/// Separators tried in order: paragraph, line, word.
pub const DEFAULT_SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Boundary-aware chunker - the default strategy for policy documents
///
/// Each chunk is at most `chunk_size` characters and starts exactly
/// `overlap` characters before the previous chunk ended. Within that window
/// the chunk is cut just after the last paragraph break; failing that the
/// last line break, then the last space, and only then at `chunk_size`
/// characters. A cut point is only usable if it leaves the chunk longer than
/// the overlap.
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Chunker with [`DEFAULT_SEPARATORS`].
    ///
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) unless
    /// `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn break_point(&self, content: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let min_end = start + self.overlap + 1;
        let window = &content[bounds[start]..bounds[hard_end]];

        for sep in self.separators.iter().filter(|s| !s.is_empty()) {
            // only the rightmost match matters, earlier ones give shorter chunks
            if let Some((idx, _)) = window.rmatch_indices(sep.as_str()).next() {
                let end = start + window[..idx + sep.len()].chars().count();
                if end >= min_end {
                    return end;
                }
            }
        }
        hard_end
    }
}

impl Chunker for RecursiveChunker {
    fn name(&self) -> &str {
        "recursive"
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn overlap(&self) -> usize {
        self.overlap
    }

    fn chunk(&self, content: &str, metadata: ChunkMetadata) -> Vec<Chunk> {
        sliding_chunks(content, self.chunk_size, self.overlap, metadata, |bounds, start, hard_end| {
            self.break_point(content, bounds, start, hard_end)
        })
    }
}
