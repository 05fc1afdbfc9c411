//! Corpus model: the source records a review is written from.
//!
//! A [`Corpus`] is built once per run from whatever a [`CorpusLoader`]
//! returns and is read-only afterwards. Citation ids are assigned by the
//! loader, are positive, and are never reused within a run.

use crate::error::CorpusError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stable integer identifier of a source record, used both as `[^N]` in
/// generated text and as the bibliography key.
pub type CitationId = u32;

/// Category string used when the corpus carries no tags at all.
pub const DEFAULT_CATEGORY: &str = "Artificial Intelligence";

/// A single normalized source record (a paper).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Positive, unique within a run
    pub citation_id: CitationId,

    pub title: String,

    /// Short abstract
    pub summary: String,

    /// Long body text (extracted full text)
    #[serde(default, alias = "text")]
    pub full_text: String,

    #[serde(default)]
    pub link: String,

    /// Category tags, primary category first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Formatted bibliographic snippet (e.g. MLA style) for the reference list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
}

impl SourceRecord {
    /// The text shown for this record in the reference list.
    pub fn reference_text(&self) -> &str {
        match &self.citation {
            Some(c) if !c.trim().is_empty() => c,
            _ => &self.title,
        }
    }
}

/// The full, validated set of source records available for a run.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<SourceRecord>,
}

impl Corpus {
    /// Validate and take ownership of the loader's records.
    ///
    /// Fails when an id is zero or assigned to more than one record.
    pub fn new(records: Vec<SourceRecord>) -> Result<Self, CorpusError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if record.citation_id == 0 {
                return Err(CorpusError::InvalidRecord(format!(
                    "'{}' has citation id 0; ids start at 1",
                    record.title
                )));
            }
            if !seen.insert(record.citation_id) {
                return Err(CorpusError::DuplicateId(record.citation_id));
            }
        }
        Ok(Self { records })
    }

    /// Like [`Corpus::new`], keeping only the first `max_records` records.
    pub fn with_limit(mut records: Vec<SourceRecord>, max_records: usize) -> Result<Self, CorpusError> {
        if records.len() > max_records {
            tracing::debug!(
                loaded = records.len(),
                kept = max_records,
                "Truncating corpus to configured maximum"
            );
            records.truncate(max_records);
        }
        Self::new(records)
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The `n` most common category tags, phrased for a prompt.
    ///
    /// Ties keep first-seen order. Yields "A", "A and B" or "A, B and C";
    /// falls back to [`DEFAULT_CATEGORY`] when no record is tagged.
    pub fn categories_summary(&self, n: usize) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for tag in self.records.iter().flat_map(|r| r.categories.iter()) {
            match counts.iter_mut().find(|(t, _)| *t == tag.as_str()) {
                Some((_, count)) => *count += 1,
                None => counts.push((tag.as_str(), 1)),
            }
        }
        // Stable sort keeps first-seen order among equal counts.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let common: Vec<&str> = counts.into_iter().take(n).map(|(t, _)| t).collect();

        match common.as_slice() {
            [] => DEFAULT_CATEGORY.to_string(),
            [only] => (*only).to_string(),
            [init @ .., last] => format!("{} and {}", init.join(", "), last),
        }
    }
}

/// The corpus source: given a query, returns ordered records with ids
/// already assigned. Consumed once at the start of a run.
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    /// Loader name for logs (e.g., "json-file").
    fn name(&self) -> &str;

    /// Load the records for `query`, in relevance order.
    async fn load(&self, query: &str) -> Result<Vec<SourceRecord>, CorpusError>;
}
