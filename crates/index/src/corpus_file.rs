//! File-based corpus loader.
//!
//! Reads source records prepared by an upstream search/extraction step from
//! either a JSON array or JSON-lines (one record per line). Records without a
//! `citation_id` get the lowest id not already taken, counting up from 1, so a
//! file without explicit ids is numbered by position.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use surveyor_core::error::CorpusError;
use surveyor_core::{CitationId, CorpusLoader, SourceRecord};
use tracing::{debug, info};

/// Loads the corpus for a run from a JSON or JSONL file.
pub struct JsonCorpusLoader {
    path: PathBuf,
}

/// On-disk record shape; `citation_id` is optional here.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    citation_id: Option<CitationId>,
    title: String,
    summary: String,
    #[serde(default, alias = "text")]
    full_text: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    published: Option<NaiveDate>,
}

impl JsonCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse file content into records with ids assigned.
    pub fn parse(content: &str) -> Result<Vec<SourceRecord>, CorpusError> {
        let raw = if content.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<RawRecord>>(content)
                .map_err(|e| CorpusError::Parse(e.to_string()))?
        } else {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str::<RawRecord>(line)
                        .map_err(|e| CorpusError::Parse(format!("line {}: {e}", n + 1)))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        assign_ids(raw)
    }
}

fn assign_ids(raw: Vec<RawRecord>) -> Result<Vec<SourceRecord>, CorpusError> {
    let mut taken = HashSet::with_capacity(raw.len());
    for r in &raw {
        match r.citation_id {
            Some(0) => {
                return Err(CorpusError::InvalidRecord(format!(
                    "'{}' has citation id 0; ids start at 1",
                    r.title
                )));
            }
            Some(id) if !taken.insert(id) => {
                return Err(CorpusError::InvalidRecord(format!(
                    "citation id {id} of '{}' is already taken",
                    r.title
                )));
            }
            _ => {}
        }
    }

    let mut next: CitationId = 1;
    let mut records = Vec::with_capacity(raw.len());
    for r in raw {
        let citation_id = match r.citation_id {
            Some(id) => id,
            None => {
                while taken.contains(&next) {
                    next = next.checked_add(1).ok_or_else(|| {
                        CorpusError::InvalidRecord(format!("no citation id left to number '{}'", r.title))
                    })?;
                }
                taken.insert(next);
                next
            }
        };

        records.push(SourceRecord {
            citation_id,
            title: r.title,
            summary: r.summary,
            full_text: r.full_text,
            link: r.link,
            categories: r.categories,
            citation: r.citation,
            published: r.published,
        });
    }

    Ok(records)
}

#[async_trait]
impl CorpusLoader for JsonCorpusLoader {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load(&self, query: &str) -> Result<Vec<SourceRecord>, CorpusError> {
        debug!(path = %self.path.display(), query, "Loading corpus file");

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CorpusError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        let records = Self::parse(&content)?;
        info!(path = %self.path.display(), records = records.len(), "Corpus loaded");
        Ok(records)
    }
}
