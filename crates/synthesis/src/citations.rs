//! Citation resolver: maps citation ids to corpus records.
//!
//! Built once per run from the [`Corpus`]. An id that does not resolve is
//! always a [`CitationError`]: unknown ids are never dropped or substituted,
//! since either would silently corrupt the bibliography.

use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use surveyor_core::error::CitationError;
use surveyor_core::{CitationId, Corpus, Outline, Section, SourceRecord};

static INLINE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^(\d+)\]").expect("inline marker pattern is valid"));

pub struct CitationResolver<'c> {
    by_id: HashMap<CitationId, &'c SourceRecord>,
}

impl<'c> CitationResolver<'c> {
    pub fn new(corpus: &'c Corpus) -> Self {
        Self {
            by_id: corpus.records().iter().map(|r| (r.citation_id, r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look up one id. `referenced_by` names the referrer in the error.
    pub fn resolve(&self, id: CitationId, referenced_by: &str) -> Result<&'c SourceRecord, CitationError> {
        self.resolve_marker(u64::from(id), referenced_by)
    }

    /// Look up the value of an inline marker, which may not fit a
    /// [`CitationId`] at all.
    fn resolve_marker(&self, value: u64, referenced_by: &str) -> Result<&'c SourceRecord, CitationError> {
        CitationId::try_from(value)
            .ok()
            .and_then(|id| self.by_id.get(&id).copied())
            .ok_or_else(|| CitationError::Unknown {
                citation_id: value,
                referenced_by: referenced_by.to_string(),
            })
    }

    /// Resolve ids in order, failing on the first unknown one.
    pub fn resolve_all(
        &self,
        ids: &[CitationId],
        referenced_by: &str,
    ) -> Result<Vec<&'c SourceRecord>, CitationError> {
        ids.iter().map(|id| self.resolve(*id, referenced_by)).collect()
    }

    /// Records cited by `section`, in its citation order.
    pub fn resolve_section(&self, section: &Section) -> Result<Vec<&'c SourceRecord>, CitationError> {
        self.resolve_all(&section.citation_ids, &section_label(section))
    }

    /// Check every id in the outline: each section's (pre-order) and the
    /// aggregate list.
    pub fn validate_outline(&self, outline: &Outline) -> Result<(), CitationError> {
        fn walk(resolver: &CitationResolver<'_>, sections: &[Section]) -> Result<(), CitationError> {
            for section in sections {
                resolver.resolve_section(section)?;
                walk(resolver, &section.children)?;
            }
            Ok(())
        }

        walk(self, &outline.sections)?;
        self.resolve_all(&outline.citation_ids, "the outline's citation list")?;
        Ok(())
    }

    /// Check every `[^N]` marker in a generated body; returns the ids in
    /// first-seen order.
    pub fn check_inline(&self, body: &str, referenced_by: &str) -> Result<Vec<CitationId>, CitationError> {
        inline_citations(body)
            .into_iter()
            .map(|value| self.resolve_marker(value, referenced_by).map(|r| r.citation_id))
            .collect()
    }

    /// The reference list: one `[^id]: [snippet](link)` entry per id of the
    /// outline's aggregate list, in that order, followed by any `cited_inline`
    /// id the aggregate lacks. Repeats are removed.
    pub fn bibliography(
        &self,
        outline: &Outline,
        cited_inline: &[CitationId],
    ) -> Result<Vec<String>, CitationError> {
        let mut seen = HashSet::new();
        outline
            .citation_ids
            .iter()
            .chain(cited_inline)
            .filter(|id| seen.insert(**id))
            .map(|id| {
                let record = self.resolve(*id, "the reference list")?;
                Ok(reference_line(record))
            })
            .collect()
    }
}

/// Format one reference entry.
pub fn reference_line(record: &SourceRecord) -> String {
    let snippet = record
        .reference_text()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("[^{}]: [{}]({})", record.citation_id, snippet, record.link)
}

/// The value of every numeric `[^N]` marker in `text`, first-seen order, no
/// repeats. Values past `u64::MAX` saturate, so they never resolve.
pub fn inline_citations(text: &str) -> Vec<u64> {
    let mut values = Vec::new();
    for caps in INLINE_MARKER.captures_iter(text) {
        let value = caps[1].parse::<u64>().unwrap_or(u64::MAX);
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

fn section_label(section: &Section) -> String {
    format!("section '{}'", section.title)
}
