//! In-memory chunk index: the similarity search used for a single run.
//!
//! Built once from the corpus and never mutated afterwards. Ranks chunks by
//! embedding cosine similarity when an embedding provider is attached,
//! otherwise by keyword overlap with the query.

use crate::splitter::TextSplitter;
use crate::vector::{rank_by_similarity, top_k};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use surveyor_core::error::SearchError;
use surveyor_core::provider::{EmbeddingRequest, Provider};
use surveyor_core::{Corpus, SimilaritySearch, TextSplit};
use tracing::{debug, info};

/// Inputs sent per embedding request.
const EMBED_BATCH_SIZE: usize = 64;

struct EmbeddingRanker {
    provider: Arc<dyn Provider>,
    model: String,
    vectors: Vec<Vec<f32>>,
}

/// A read-only index over the chunks of every corpus record, in corpus order.
pub struct InMemoryIndex {
    chunks: Vec<TextSplit>,
    ranker: Option<EmbeddingRanker>,
}

impl InMemoryIndex {
    /// Index pre-split chunks with keyword ranking.
    pub fn from_chunks(chunks: Vec<TextSplit>) -> Self {
        Self {
            chunks,
            ranker: None,
        }
    }

    /// Split every record of `corpus` and index the chunks.
    pub fn build(corpus: &Corpus, splitter: &TextSplitter) -> Result<Self, SearchError> {
        let mut chunks = Vec::new();
        for record in corpus.records() {
            let splits = splitter
                .split_record(record)
                .map_err(|e| SearchError::Unavailable(format!("Failed to split '{}': {e}", record.title)))?;
            chunks.extend(splits);
        }

        info!(
            records = corpus.len(),
            chunks = chunks.len(),
            chunk_size = splitter.chunk_size(),
            "Built chunk index"
        );
        Ok(Self::from_chunks(chunks))
    }

    /// Embed every chunk with `provider` and switch to cosine ranking.
    pub async fn with_embeddings(
        mut self,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let model = model.into();
        let mut vectors = Vec::with_capacity(self.chunks.len());

        for batch in self.chunks.chunks(EMBED_BATCH_SIZE) {
            let response = provider
                .embed(EmbeddingRequest {
                    model: model.clone(),
                    inputs: batch.iter().map(|c| c.text.clone()).collect(),
                })
                .await
                .map_err(|e| SearchError::EmbeddingFailed(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(SearchError::EmbeddingFailed(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings);
        }

        debug!(provider = provider.name(), model = %model, vectors = vectors.len(), "Embedded chunk index");

        self.ranker = Some(EmbeddingRanker {
            provider,
            model,
            vectors,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn uses_embeddings(&self) -> bool {
        self.ranker.is_some()
    }

    fn keyword_search(&self, query: &str, k: usize) -> Vec<TextSplit> {
        let terms: HashSet<String> = terms(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let scores: Vec<f32> = self
            .chunks
            .iter()
            .map(|chunk| keyword_score(&terms, &chunk.text))
            .collect();

        top_k(&scores, k)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(i, _)| self.chunks[i].clone())
            .collect()
    }
}

#[async_trait]
impl SimilaritySearch for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<TextSplit>, SearchError> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let Some(ranker) = &self.ranker else {
            return Ok(self.keyword_search(query, k));
        };

        let response = ranker
            .provider
            .embed(EmbeddingRequest {
                model: ranker.model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| SearchError::EmbeddingFailed(e.to_string()))?;

        let query_vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::QueryFailed("embedding response was empty".into()))?;

        Ok(rank_by_similarity(&ranker.vectors, &query_vector, k)
            .into_iter()
            .map(|(i, _)| self.chunks[i].clone())
            .collect())
    }
}

/// Lowercased alphanumeric terms longer than two characters.
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
}

/// Query-term occurrences, normalized by chunk length in hundreds of words.
fn keyword_score(query_terms: &HashSet<String>, text: &str) -> f32 {
    let mut words = 0usize;
    let mut hits = 0usize;
    for term in terms(text) {
        words += 1;
        if query_terms.contains(&term) {
            hits += 1;
        }
    }
    hits as f32 / (words as f32 / 100.0).max(1.0)
}
