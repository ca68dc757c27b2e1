//! Token-bounded semantic chunking with a sliding overlap.
//!
//! Text is split by `semchunk-rs` against a `cl100k_base` token budget. Each chunk after the first
//! is then prefixed with the whole-word tail of its predecessor, holding at most `overlap` tokens
//! and never pushing the chunk past its budget, so boundary sentences stay retrievable from both
//! sides.

use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while configuring the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Zero-token chunks were requested.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The blocking chunking task panicked or was cancelled.
    #[error("chunking task failed: {0}")]
    TaskFailed(String),
}

/// One chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position within the document.
    pub ordinal: usize,
    /// Chunk text.
    pub text: String,
    /// Tokens in `text`.
    pub tokens: usize,
}

/// Reusable chunker holding the tokenizer and budgets.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TextChunker {
    /// Chunker with a `chunk_size`-token budget and `overlap` tokens of carry-over.
    ///
    /// Falls back to whitespace token counting when the BPE tables cannot be loaded.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        let counter = match cl100k_base() {
            Ok(encoding) => {
                let encoding = Arc::new(encoding);
                Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len()) as TokenCounter
            }
            Err(error) => {
                tracing::warn!(error = %error, "cl100k_base unavailable; counting whitespace tokens");
                whitespace_counter()
            }
        };
        Self::with_counter(chunk_size, overlap, counter)
    }

    fn with_counter(
        chunk_size: usize,
        overlap: usize,
        counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            counter,
        })
    }

    /// Token budget per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Count tokens the way the chunker does.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    /// Split `text` into ordered chunks; blank input yields none.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let counter = self.counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let pieces = chunker.chunk(text);

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut previous: Option<&str> = None;
        for piece in &pieces {
            let text = match previous {
                Some(before) if self.overlap > 0 => self.with_carry_over(before, piece),
                _ => piece.clone(),
            };
            previous = Some(piece.as_str());
            if text.trim().is_empty() {
                continue;
            }
            chunks.push(TextChunk {
                ordinal: chunks.len(),
                tokens: self.count_tokens(&text),
                text,
            });
        }
        chunks
    }

    /// Chunk on the blocking pool so tokenization never stalls async workers.
    pub async fn chunk_blocking(&self, text: String) -> Result<Vec<TextChunk>, ChunkingError> {
        let chunker = self.clone();
        tokio::task::spawn_blocking(move || chunker.chunk(&text))
            .await
            .map_err(|error| ChunkingError::TaskFailed(error.to_string()))
    }

    fn with_carry_over(&self, previous: &str, current: &str) -> String {
        let room = self.chunk_size.saturating_sub(self.count_tokens(current));
        let tail = self.suffix_within(previous, self.overlap.min(room));
        if tail.is_empty() {
            return current.to_string();
        }
        let current_trimmed = current.trim_start();
        let mut combined = String::with_capacity(tail.len() + current_trimmed.len() + 1);
        combined.push_str(tail.trim_end());
        combined.push(' ');
        combined.push_str(current_trimmed);
        // Joining can merge tokens differently; never exceed the budget.
        if self.count_tokens(&combined) > self.chunk_size {
            return current.to_string();
        }
        combined
    }

    /// Longest suffix of `text` that starts on a word and holds at most `budget` tokens.
    ///
    /// Candidate starts are word boundaries only, found by binary search, so the tokenizer runs a
    /// logarithmic number of times per call.
    fn suffix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if budget == 0 {
            return "";
        }
        let starts = word_starts(text);
        let (mut low, mut high) = (0, starts.len());
        while low < high {
            let mid = low + (high - low) / 2;
            if self.count_tokens(&text[starts[mid]..]) <= budget {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        starts.get(low).map_or("", |&start| &text[start..])
    }
}

/// Byte offsets where a word begins: the first non-whitespace character after whitespace.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_gap = true;
    for (offset, ch) in text.char_indices() {
        let gap = ch.is_whitespace();
        if in_gap && !gap {
            starts.push(offset);
        }
        in_gap = gap;
    }
    starts
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() { 1 } else { tokens }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(chunk_size: usize, overlap: usize) -> TextChunker {
        TextChunker::with_counter(chunk_size, overlap, whitespace_counter()).unwrap()
    }

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    #[test]
    fn splits_on_budget_without_overlap() {
        let chunks = words(2, 0).chunk("one two three four five");
        assert_eq!(texts(&chunks), vec!["one two", "three four", "five"]);
        assert_eq!(chunks[2].ordinal, 2);
    }

    #[test]
    fn carries_tail_of_previous_chunk() {
        let chunker = words(3, 1);
        let chunks = chunker.chunk("one two three four five");
        assert_eq!(texts(&chunks), vec!["one two three", "three four five"]);
        assert!(chunks.iter().all(|chunk| chunk.tokens <= 3));
    }

    #[test]
    fn blank_input_has_no_chunks() {
        assert!(words(4, 1).chunk(" \n\t ").is_empty());
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(TextChunker::new(0, 0), Err(ChunkingError::InvalidChunkSize)));
    }

    #[test]
    fn cl100k_chunks_respect_budget_and_keep_words() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunker = TextChunker::new(5, 0).unwrap();
        let chunks = chunker.chunk(text);
        assert!(chunks.iter().all(|chunk| chunker.count_tokens(&chunk.text) <= 5));
        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.text.split_whitespace())
            .collect();
        assert_eq!(rejoined, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn overlap_starts_on_a_word_boundary() {
        let sentence = "Revenue substantially improved quarterly performance indicators across regions.";
        let vocabulary: std::collections::HashSet<&str> = sentence.split_whitespace().collect();
        let text = vec![sentence; 60].join(" ");
        let chunker = TextChunker::new(48, 12).unwrap();
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.tokens <= 48, "chunk over budget: {}", chunk.tokens);
            let first = chunk.text.split_whitespace().next().unwrap();
            assert!(vocabulary.contains(first), "chunk starts mid-word: {first:?}");
        }
    }

    #[test]
    fn carry_over_tail_search_is_logarithmic() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let base = whitespace_counter();
        let counter: TokenCounter = Arc::new(move |segment: &str| {
            counted.fetch_add(1, Ordering::SeqCst);
            base.as_ref()(segment)
        });
        let chunker = TextChunker::with_counter(512, 64, counter).unwrap();
        let previous = (0..2048).map(|n| format!("w{n}")).collect::<Vec<_>>().join(" ");

        let tail = chunker.suffix_within(&previous, 64);
        assert_eq!(tail.split_whitespace().count(), 64);
        assert!(tail.starts_with("w1984"));
        assert!(calls.load(Ordering::SeqCst) <= 12, "calls: {}", calls.load(Ordering::SeqCst));
    }

    #[test]
    fn word_starts_skip_leading_and_repeated_whitespace() {
        assert_eq!(word_starts("  ab  c\nd"), vec![2, 6, 8]);
        assert!(word_starts(" \t ").is_empty());
    }

    #[tokio::test]
    async fn blocking_chunking_matches_inline() {
        let chunker = words(3, 1);
        let inline = chunker.chunk("one two three four five");
        let offloaded = chunker
            .chunk_blocking("one two three four five".to_string())
            .await
            .unwrap();
        assert_eq!(inline, offloaded);
    }
}
