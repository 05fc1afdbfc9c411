//! Shared test helpers for pipeline and step tests.

use async_trait::async_trait;
use std::sync::Mutex;
use surveyor_core::error::{ProviderError, SearchError, TokenizerError};
use surveyor_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use surveyor_core::{CitationId, Corpus, Message, SimilaritySearch, SourceRecord, TextSplit, Tokenizer};

/// A mock provider that returns a sequence of scripted responses and keeps
/// every request it receives.
///
/// Once the script runs out, further calls fail with a provider error.
pub struct SequentialMockProvider {
    responses: Vec<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    /// Calls answered so far.
    pub fn call_count(&self) -> usize {
        let requests = self.requests.lock().unwrap();
        requests.len().min(self.responses.len())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);
        self.responses.get(call).cloned().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                self.responses.len()
            ))
        })
    }
}

/// A provider whose calls never complete.
pub struct StalledProvider;

#[async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// One token per whitespace-separated word.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(text.split_whitespace().count())
    }
}

/// A search index answering every query with the same chunks.
pub struct FixedSearch {
    pub chunks: Vec<TextSplit>,
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl FixedSearch {
    pub fn new(chunks: Vec<TextSplit>) -> Self {
        Self {
            chunks,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimilaritySearch for FixedSearch {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<TextSplit>, SearchError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}

pub fn make_record(id: CitationId) -> SourceRecord {
    SourceRecord {
        citation_id: id,
        title: format!("Paper {id}"),
        summary: format!("Summary of paper {id}"),
        full_text: String::new(),
        link: format!("https://arxiv.org/abs/{id}"),
        categories: vec!["Machine Learning".into()],
        citation: None,
        published: None,
    }
}

/// Records numbered `1..=n`.
pub fn make_corpus(n: CitationId) -> Corpus {
    Corpus::new((1..=n).map(make_record).collect()).unwrap()
}
