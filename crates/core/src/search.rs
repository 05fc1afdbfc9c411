//! Similarity search: ranked retrieval of sub-document chunks.
//!
//! The pipeline only consumes the ranked list; it never mutates an index.

use crate::corpus::CitationId;
use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A uniform packer input: either a whole record summary or a retrieved chunk.
///
/// Ephemeral; recomputed for every section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSplit {
    pub title: String,
    pub citation_id: CitationId,
    pub text: String,
}

impl TextSplit {
    pub fn new(title: impl Into<String>, citation_id: CitationId, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            citation_id,
            text: text.into(),
        }
    }
}

/// The similarity search collaborator.
///
/// Implementations: in-memory chunk index (embeddings or keyword overlap),
/// no-op index.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// The index name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Return at most `k` chunks ranked by descending relevance to `query`.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<TextSplit>, SearchError>;
}
