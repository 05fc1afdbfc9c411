//! Token-budgeted snippet packer.
//!
//! Selects the longest prefix of an ordered candidate list whose cumulative
//! token cost fits a limit. Candidate order is relevance priority, so the
//! packer never reorders and never skips ahead: the first candidate that does
//! not fit ends the selection, even if a shorter one after it would fit.
//!
//! # Block format
//!
//! Each included split is rendered as
//!
//! ```text
//! Title: <title>
//! citation_id: <id>
//! Text: <text>
//! ```
//!
//! with newlines inside the fields flattened to spaces. The cost of a
//! candidate is the token count of exactly this block, measured in isolation
//! with the run's tokenizer.

use serde::{Deserialize, Serialize};
use surveyor_core::error::TokenizerError;
use surveyor_core::{SourceRecord, TextSplit, Tokenizer};
use tracing::debug;

/// Separator placed between rendered blocks in the prompt.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Outcome counters for one packing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStats {
    /// Candidates offered.
    pub candidates: usize,
    /// Candidates selected (always a prefix).
    pub included: usize,
    /// Sum of the selected blocks' costs.
    pub tokens: usize,
    /// The limit packed against.
    pub budget: usize,
    /// Cost of the first excluded candidate, when the selection was cut short.
    pub first_excluded_tokens: Option<usize>,
}

impl PackStats {
    pub fn dropped(&self) -> usize {
        self.candidates - self.included
    }
}

/// The selected prefix, already rendered for a prompt.
#[derive(Debug, Clone)]
pub struct PackedContext {
    /// Rendered blocks joined by [`BLOCK_SEPARATOR`]; empty when nothing fit.
    pub text: String,
    /// The selected candidates, in input order.
    pub included: Vec<TextSplit>,
    pub stats: PackStats,
}

impl PackedContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Greedy first-fit-stop packer. Stateless apart from the tokenizer.
pub struct Packer<'a> {
    tokenizer: &'a dyn Tokenizer,
}

impl<'a> Packer<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Select the longest prefix of `candidates` whose block costs sum to at
    /// most `limit`.
    ///
    /// An empty selection (the first candidate alone is over the limit, or
    /// there are no candidates) is a valid outcome, not an error.
    pub fn pack(&self, candidates: &[TextSplit], limit: usize) -> Result<PackedContext, TokenizerError> {
        let mut blocks = Vec::new();
        let mut used = 0usize;
        let mut first_excluded_tokens = None;

        for candidate in candidates {
            let block = render_block(candidate);
            let cost = self.tokenizer.count(&block)?;
            if used + cost > limit {
                first_excluded_tokens = Some(cost);
                break;
            }
            used += cost;
            blocks.push(block);
        }

        let included = candidates[..blocks.len()].to_vec();
        let stats = PackStats {
            candidates: candidates.len(),
            included: included.len(),
            tokens: used,
            budget: limit,
            first_excluded_tokens,
        };

        debug!(
            tokenizer = self.tokenizer.name(),
            included = stats.included,
            candidates = stats.candidates,
            tokens = stats.tokens,
            budget = stats.budget,
            "Packed context"
        );

        Ok(PackedContext {
            text: blocks.join(BLOCK_SEPARATOR),
            included,
            stats,
        })
    }
}

/// Render one candidate as a prompt block.
pub fn render_block(split: &TextSplit) -> String {
    format!(
        "Title: {}\ncitation_id: {}\nText: {}",
        flatten(&split.title),
        split.citation_id,
        flatten(&split.text)
    )
}

fn flatten(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// One candidate per record, carrying the record's summary.
pub fn summary_splits<'r>(records: impl IntoIterator<Item = &'r SourceRecord>) -> Vec<TextSplit> {
    records
        .into_iter()
        .map(|r| TextSplit::new(&r.title, r.citation_id, &r.summary))
        .collect()
}
