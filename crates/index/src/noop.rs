//! No-op index: disables chunk retrieval entirely.
//!
//! Sections are then packed from their cited summaries alone.

use async_trait::async_trait;
use surveyor_core::error::SearchError;
use surveyor_core::{SimilaritySearch, TextSplit};

/// A similarity search that never returns anything.
pub struct NoopIndex;

#[async_trait]
impl SimilaritySearch for NoopIndex {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<TextSplit>, SearchError> {
        Ok(Vec::new())
    }
}
