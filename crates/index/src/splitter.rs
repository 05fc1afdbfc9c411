//! Token-bounded text splitter.
//!
//! Record full texts are normalized and cut into overlapping chunks measured
//! with the same [`Tokenizer`] the packer uses. Sentences are kept whole where
//! they fit; an oversized sentence is broken on word boundaries.

use regex_lite::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use surveyor_core::error::TokenizerError;
use surveyor_core::{SourceRecord, TextSplit, Tokenizer};

static SPECIAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[A-Za-z0-9_]+\|>").expect("special token pattern is valid"));

pub struct TextSplitter {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tokenizer,
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split one record into chunks tagged with its title and citation id.
    ///
    /// Records without full text are indexed by their summary.
    pub fn split_record(&self, record: &SourceRecord) -> Result<Vec<TextSplit>, TokenizerError> {
        let body = if record.full_text.trim().is_empty() {
            &record.summary
        } else {
            &record.full_text
        };

        Ok(self
            .split_text(body)?
            .into_iter()
            .map(|text| TextSplit::new(&record.title, record.citation_id, text))
            .collect())
    }

    /// Split `text` into chunks of at most `chunk_size` tokens.
    ///
    /// Consecutive chunks share up to `chunk_overlap` tokens of trailing
    /// pieces. A single word larger than `chunk_size` becomes its own chunk.
    pub fn split_text(&self, text: &str) -> Result<Vec<String>, TokenizerError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces: Vec<(String, usize)> = Vec::new();
        for sentence in sentences(&normalized) {
            let tokens = self.tokenizer.count(sentence)?;
            if tokens <= self.chunk_size {
                pieces.push((sentence.to_string(), tokens));
                continue;
            }
            for word in sentence.split(' ').filter(|w| !w.is_empty()) {
                pieces.push((word.to_string(), self.tokenizer.count(word)?));
            }
        }

        Ok(self.merge(pieces))
    }

    fn merge(&self, pieces: Vec<(String, usize)>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0usize;

        for (piece, tokens) in pieces {
            if total + tokens > self.chunk_size && !window.is_empty() {
                chunks.push(join(&window));
                // Keep a tail of at most `chunk_overlap` tokens that still
                // leaves room for the incoming piece.
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + tokens > self.chunk_size)
                {
                    if let Some((_, dropped)) = window.pop_front() {
                        total -= dropped;
                    }
                }
            }
            total += tokens;
            window.push_back((piece, tokens));
        }

        if !window.is_empty() {
            chunks.push(join(&window));
        }
        chunks
    }
}

fn join(window: &VecDeque<(String, usize)>) -> String {
    window
        .iter()
        .map(|(piece, _)| piece.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flatten whitespace (newlines included) to single spaces and drop
/// tokenizer control markers such as `<|endoftext|>`.
pub fn normalize(text: &str) -> String {
    SPECIAL_TOKEN
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence pieces of already-normalized text, terminators kept.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') && bytes.get(i + 1) == Some(&b' ') {
            out.push(text[start..=i].trim());
            start = i + 2;
        }
    }
    if start < text.len() {
        out.push(text[start..].trim());
    }
    out.retain(|s| !s.is_empty());
    out
}
