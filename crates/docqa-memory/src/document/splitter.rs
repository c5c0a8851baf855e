use super::DocumentError;
use super::types::{Chunk, Document};

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same document.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or the overlap does not fit inside a chunk.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.chunk_size == 0 {
            return Err(DocumentError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocumentError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Boundary kinds tried in order before falling back to a hard cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn try_new(config: SplitterConfig) -> Result<Self, DocumentError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.content.trim().is_empty() {
            return Vec::new();
        }

        split_chars(
            &document.content,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )
        .into_iter()
        .enumerate()
        .map(|(i, (start, content))| Chunk {
            content,
            metadata: document.metadata.clone(),
            chunk_index: i,
            start,
        })
        .collect()
    }

    /// Split every document in order, preserving source order in the output.
    #[must_use]
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }
}

/// Split `text` into `(char_offset, chunk)` pairs.
///
/// Chunk `i + 1` always starts exactly `overlap` characters before chunk `i` ends.
fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    let overlap = overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        if len - start <= size {
            chunks.push((start, chars[start..].iter().collect()));
            break;
        }
        let hard_end = start + size;
        let end = find_cut(&chars, start, hard_end, overlap).unwrap_or(hard_end);
        chunks.push((start, chars[start..end].iter().collect()));
        start = end - overlap;
    }

    chunks
}

/// Find the best cut in `(start, hard_end]`, preferring stronger boundaries.
///
/// Only the second half of the window is considered so chunks stay reasonably full,
/// and the cut must lie past the overlap so the next chunk starts after `start`.
fn find_cut(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> Option<usize> {
    let size = hard_end - start;
    let min_cut = (start + overlap + 1).max(start + size.div_ceil(2));
    if min_cut > hard_end {
        return None;
    }

    BOUNDARIES.iter().find_map(|&kind| {
        (min_cut..=hard_end)
            .rev()
            .find(|&pos| is_boundary(chars, pos, kind))
    })
}

/// Whether cutting before `chars[pos]` lands on a boundary of the given kind.
fn is_boundary(chars: &[char], pos: usize, kind: Boundary) -> bool {
    if pos == 0 || pos >= chars.len() {
        return false;
    }
    let prev = chars[pos - 1];
    let next = chars[pos];
    match kind {
        Boundary::Paragraph => pos >= 2 && prev == '\n' && chars[pos - 2] == '\n',
        Boundary::Line => prev == '\n',
        Boundary::Sentence => matches!(prev, '.' | '?' | '!') && next.is_whitespace(),
        Boundary::Word => prev.is_whitespace() || next.is_whitespace(),
    }
}
