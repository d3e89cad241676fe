//! Split extracted text into bounded pieces (C4).

use regex::Regex;

use crate::error::{FilexError, Result};

/// Shared capability of both chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split `text` into an ordered sequence of non-empty strings. Never
    /// returns an empty vector for non-empty input.
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Estimate how many chunks `chunk` would produce for a string of the
    /// given byte length, without running the split. Always >= 1.
    fn estimate_count(&self, len: usize) -> usize;
}

/// Walks the string in steps of `chunk_size - overlap`, dropping
/// whitespace-only pieces. Falls back to the whole input as a single chunk
/// if every walked piece was whitespace-only.
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
    step: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(FilexError::InvalidArgument("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(FilexError::InvalidArgument("overlap must be < chunk_size".into()));
        }
        Ok(Self { chunk_size, overlap, step: chunk_size - overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < len {
            let end = (start + self.chunk_size).min(len);
            let piece: String = chars[start..end].iter().collect();
            if !piece.trim().is_empty() {
                chunks.push(piece);
            }
            start += self.step;
        }

        if chunks.is_empty() {
            chunks.push(text.to_string());
        }
        chunks
    }

    fn estimate_count(&self, len: usize) -> usize {
        ((len as f64) / (self.step as f64)).ceil().max(1.0) as usize
    }
}

/// Splits on sentence-ending punctuation and greedily accumulates sentences
/// into chunks bounded by `target` (soft) and `max` (hard).
pub struct SentenceAwareChunker {
    target: usize,
    max: usize,
    splitter: Regex,
}

impl SentenceAwareChunker {
    pub fn new(target: usize, max: Option<usize>) -> Result<Self> {
        if target == 0 {
            return Err(FilexError::InvalidArgument("target must be > 0".into()));
        }
        let max = max.unwrap_or(target * 2);
        if max < target {
            return Err(FilexError::InvalidArgument("max must be >= target".into()));
        }
        let splitter =
            Regex::new(r"[.!?]+(\s+|$)").expect("sentence splitter regex is a compile-time const");
        Ok(Self { target, max, splitter })
    }
}

impl Chunker for SentenceAwareChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let sentences: Vec<String> = self
            .splitter
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            let candidate_len = if current.is_empty() {
                sentence.len()
            } else {
                current.len() + 1 + sentence.len()
            };

            if !current.is_empty() && candidate_len > self.target {
                chunks.push(std::mem::take(&mut current));
            }

            if current.is_empty() {
                current = sentence;
            } else {
                current.push(' ');
                current.push_str(&sentence);
            }

            if current.len() >= self.max {
                chunks.push(std::mem::take(&mut current));
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    fn estimate_count(&self, len: usize) -> usize {
        ((len as f64) / (self.target as f64)).ceil().max(1.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_never_returns_empty_for_nonempty_input() {
        let c = FixedSizeChunker::new(4, 0).unwrap();
        let chunks = c.chunk("abcdefgh");
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn fixed_size_whitespace_only_falls_back_to_whole_text() {
        let c = FixedSizeChunker::new(2, 0).unwrap();
        let chunks = c.chunk("   ");
        assert_eq!(chunks, vec!["   "]);
    }

    #[test]
    fn fixed_size_rejects_bad_params() {
        assert!(FixedSizeChunker::new(0, 0).is_err());
        assert!(FixedSizeChunker::new(4, 4).is_err());
        assert!(FixedSizeChunker::new(4, 5).is_err());
    }

    #[test]
    fn fixed_size_estimate_is_at_least_one() {
        let c = FixedSizeChunker::new(512, 50).unwrap();
        assert_eq!(c.estimate_count(0), 1);
        assert!(c.estimate_count(16) >= 1);
    }

    #[test]
    fn sentence_aware_splits_on_punctuation() {
        let c = SentenceAwareChunker::new(100, None).unwrap();
        let chunks = c.chunk("One. Two! Three?");
        assert_eq!(chunks, vec!["One Two Three"]);
    }

    #[test]
    fn sentence_aware_closes_chunk_past_target() {
        let c = SentenceAwareChunker::new(5, Some(10)).unwrap();
        let chunks = c.chunk("Hello there. Another sentence follows.");
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn sentence_aware_rejects_bad_params() {
        assert!(SentenceAwareChunker::new(0, None).is_err());
        assert!(SentenceAwareChunker::new(10, Some(5)).is_err());
    }
}
