use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// How a document is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Split on blank-line boundaries; segments below the minimum length are dropped.
    Paragraph,
    /// Accumulate sentences until the maximum length, never splitting mid-sentence.
    SentenceGroup,
    /// Fixed-size windows with overlap; stride is `max_chunk_len - overlap`.
    SlidingWindow,
}

impl ChunkStrategy {
    /// The chunk-type tag recorded on every chunk produced by this strategy.
    pub fn kind(&self) -> &'static str {
        match self {
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::SentenceGroup => "sentence_group",
            ChunkStrategy::SlidingWindow => "fixed_size",
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paragraph" => Ok(ChunkStrategy::Paragraph),
            "sentence" | "sentence_group" => Ok(ChunkStrategy::SentenceGroup),
            "fixed_size" | "sliding_window" => Ok(ChunkStrategy::SlidingWindow),
            other => Err(format!(
                "unknown chunk strategy '{other}' (expected paragraph, sentence, or fixed_size)"
            )),
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Length limits for chunking, in bytes of UTF-8 text.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Segments shorter than this are dropped (except when the whole
    /// document is shorter, which yields a single unfiltered chunk).
    pub min_chunk_len: usize,
    /// Upper bound on chunk length for sentence grouping and sliding windows.
    pub max_chunk_len: usize,
    /// Overlap between consecutive sliding windows.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_len: 50,
            max_chunk_len: 1000,
            overlap: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn with_min_chunk_len(mut self, min_chunk_len: usize) -> Self {
        self.min_chunk_len = min_chunk_len;
        self
    }

    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

/// A contiguous sub-span of a document, addressable by absolute byte offsets.
///
/// `text` is always equal to the `start..end` slice of the original document,
/// so snippets can be reconstructed from offsets alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub kind: &'static str,
}

/// Splits document text into [`Chunk`]s using a fixed strategy and config.
///
/// The sentence boundary pattern is a naive `[.!?]` run followed by
/// whitespace; abbreviation-heavy text ("Dr. Smith et al.") will over-split.
pub struct Chunker {
    strategy: ChunkStrategy,
    config: ChunkerConfig,
    paragraph_re: Regex,
    sentence_re: Regex,
}

impl Chunker {
    pub fn new(strategy: ChunkStrategy, config: ChunkerConfig) -> Self {
        Self {
            strategy,
            config,
            paragraph_re: Regex::new(r"\n[ \t]*\n+").expect("valid paragraph pattern"),
            sentence_re: Regex::new(r"[.!?]+(?:\s+|$)").expect("valid sentence pattern"),
        }
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into ordered chunks with absolute byte offsets.
    ///
    /// Empty or whitespace-only input yields no chunks. A non-empty document
    /// shorter than `min_chunk_len` yields exactly one chunk covering the
    /// trimmed text, regardless of strategy.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if trimmed.len() < self.config.min_chunk_len {
            let start = text.len() - text.trim_start().len();
            return vec![self.make_chunk(text, start, start + trimmed.len())];
        }

        match self.strategy {
            ChunkStrategy::Paragraph => self.chunk_paragraphs(text),
            ChunkStrategy::SentenceGroup => self.chunk_sentences(text),
            ChunkStrategy::SlidingWindow => self.chunk_windows(text),
        }
    }

    fn make_chunk(&self, text: &str, start: usize, end: usize) -> Chunk {
        Chunk {
            text: text[start..end].to_string(),
            start,
            end,
            kind: self.strategy.kind(),
        }
    }

    fn chunk_paragraphs(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut last = 0;
        for sep in self.paragraph_re.find_iter(text) {
            self.push_paragraph(text, last..sep.start(), &mut chunks);
            last = sep.end();
        }
        self.push_paragraph(text, last..text.len(), &mut chunks);
        chunks
    }

    fn push_paragraph(&self, text: &str, range: Range<usize>, out: &mut Vec<Chunk>) {
        if let Some((start, end)) = trimmed_bounds(text, range) {
            if end - start >= self.config.min_chunk_len {
                out.push(self.make_chunk(text, start, end));
            }
        }
    }

    fn chunk_sentences(&self, text: &str) -> Vec<Chunk> {
        let sentences = self.sentence_spans(text);
        let mut chunks = Vec::new();
        let mut group: Option<(usize, usize)> = None;

        for &(start, end) in &sentences {
            group = match group {
                None => Some((start, end)),
                Some((gs, ge)) => {
                    if end - gs > self.config.max_chunk_len {
                        if ge - gs >= self.config.min_chunk_len {
                            chunks.push(self.make_chunk(text, gs, ge));
                        }
                        Some((start, end))
                    } else {
                        Some((gs, end))
                    }
                }
            };
        }
        if let Some((gs, ge)) = group {
            if ge - gs >= self.config.min_chunk_len {
                chunks.push(self.make_chunk(text, gs, ge));
            }
        }
        chunks
    }

    /// Trimmed byte spans of each sentence, terminator punctuation included.
    fn sentence_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut last = 0;
        for boundary in self.sentence_re.find_iter(text) {
            if let Some(bounds) = trimmed_bounds(text, last..boundary.end()) {
                spans.push(bounds);
            }
            last = boundary.end();
        }
        if last < text.len() {
            if let Some(bounds) = trimmed_bounds(text, last..text.len()) {
                spans.push(bounds);
            }
        }
        spans
    }

    fn chunk_windows(&self, text: &str) -> Vec<Chunk> {
        let stride = self
            .config
            .max_chunk_len
            .saturating_sub(self.config.overlap)
            .max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let end = floor_char_boundary(text, (start + self.config.max_chunk_len).min(text.len()));
            if end - start >= self.config.min_chunk_len {
                chunks.push(self.make_chunk(text, start, end));
            }
            if end == text.len() {
                break;
            }
            let mut next = floor_char_boundary(text, start + stride);
            if next <= start {
                next = ceil_char_boundary(text, start + 1);
            }
            start = next;
        }
        chunks
    }
}

/// Bounds of `range` after trimming surrounding whitespace; None if empty.
fn trimmed_bounds(text: &str, range: Range<usize>) -> Option<(usize, usize)> {
    let segment = &text[range.clone()];
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = range.start + (segment.len() - segment.trim_start().len());
    Some((start, start + trimmed.len()))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
