//! Document model: the structured values produced by generation steps.
//!
//! [`Overview`] and [`Outline`] are generated exactly once per run and never
//! mutated after acceptance. [`Section`] is an owned recursive tree: each node
//! owns its children, so cycles cannot be expressed.

use crate::corpus::CitationId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The compass for the whole review: title, main points, and prose overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    /// Title of the systematic review
    pub title: String,

    /// Main points that make up the review, in order
    pub main_points: Vec<String>,

    /// Overview prose
    pub overview: String,
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "Points:")?;
        for point in &self.main_points {
            writeln!(f, "  - {point}")?;
        }
        write!(f, "Overview: {}", self.overview)
    }
}

/// A node of the outline tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,

    /// Brief description (about 30 words)
    #[serde(default)]
    pub description: String,

    /// Records this section cites; may be empty
    #[serde(default, deserialize_with = "lenient_ids")]
    pub citation_ids: Vec<CitationId>,

    /// Subsections in document order; `null` and missing both mean none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<Section>,
}

impl Section {
    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Section::node_count).sum::<usize>()
    }
}

/// The section tree plus the aggregate list of every cited record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Top-level sections in document order
    pub sections: Vec<Section>,

    /// Every citation id referenced anywhere in the review, in bibliography order
    #[serde(default, alias = "citations_ids", deserialize_with = "lenient_ids")]
    pub citation_ids: Vec<CitationId>,
}

impl Outline {
    /// Total node count of the section tree.
    pub fn node_count(&self) -> usize {
        self.sections.iter().map(Section::node_count).sum()
    }

    /// Extend the aggregate list with every section id it lacks, in
    /// pre-order, after the ids already listed. Returns how many were added.
    pub fn complete_citation_ids(&mut self) -> usize {
        fn collect(sections: &[Section], ids: &mut Vec<CitationId>) {
            for section in sections {
                for id in &section.citation_ids {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
                collect(&section.children, ids);
            }
        }

        let listed = self.citation_ids.len();
        collect(&self.sections, &mut self.citation_ids);
        self.citation_ids.len() - listed
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Models sometimes quote ids ("3"); accept both forms, reject anything else.
fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<CitationId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(CitationId),
        Text(String),
    }

    let raw = Option::<Vec<RawId>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|id| match id {
            RawId::Number(n) => Ok(n),
            RawId::Text(s) => s.trim().parse::<CitationId>().map_err(|_| {
                serde::de::Error::custom(format!("citation id '{s}' is not a positive integer"))
            }),
        })
        .collect()
}
