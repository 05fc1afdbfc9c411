//! Error types for the Surveyor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Every variant of the
//! top-level [`Error`] aborts a run; the only locally recovered condition is a
//! [`SchemaError`], which the structured generation step repairs before it
//! ever surfaces as a [`GenerationError`].

use thiserror::Error;

/// The top-level error type for all Surveyor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- External collaborators ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Similarity search error: {0}")]
    Search(#[from] SearchError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    // --- Pipeline failures ---
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Citation integrity violation: {0}")]
    Citation(#[from] CitationError),

    #[error("Run cancelled")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable short label for logs and exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Search(_) => "search",
            Self::Tokenizer(_) => "tokenizer",
            Self::Corpus(_) => "corpus",
            Self::Generation(_) => "generation",
            Self::Citation(_) => "citation",
            Self::Cancelled => "cancelled",
            Self::Config { .. } => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// True when the failure came from an external collaborator
    /// (language model, similarity search, tokenizer, corpus loader).
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Search(_) | Self::Tokenizer(_) | Self::Corpus(_)
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Unsupported model or encoding: {0}")]
    UnsupportedModel(String),

    #[error("Tokenization failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to read corpus at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse corpus: {0}")]
    Parse(String),

    #[error("Invalid source record: {0}")]
    InvalidRecord(String),

    #[error("Citation id {0} assigned to more than one record")]
    DuplicateId(u32),

    #[error("Corpus source unavailable: {0}")]
    Unavailable(String),
}

/// A model reply that does not fit its target schema.
///
/// Recovered locally by the repair attempt; the message is fed back to the
/// model verbatim, so it should say what is wrong with the reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("{step} reply still invalid after {attempts} repair attempt(s): {last_error}")]
    RepairExhausted {
        step: String,
        attempts: u32,
        last_error: SchemaError,
    },

    #[error("Prompt template for {step} has no binding for placeholder '{placeholder}'")]
    UnboundPlaceholder { step: String, placeholder: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CitationError {
    #[error("citation id {citation_id} referenced by {referenced_by} is not in the corpus")]
    /// `citation_id` is wide enough to report inline markers that overflow
    /// a [`CitationId`](crate::CitationId).
    Unknown {
        citation_id: u64,
        referenced_by: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
        assert!(err.is_external());
    }

    #[test]
    fn citation_error_names_the_id() {
        let err: Error = CitationError::Unknown {
            citation_id: 7,
            referenced_by: "section 'Conclusion'".into(),
        }
        .into();
        assert_eq!(err.kind(), "citation");
        assert!(err.to_string().contains("citation id 7"));
        assert!(err.to_string().contains("Conclusion"));
        assert!(!err.is_external());
    }

    #[test]
    fn repair_exhausted_carries_last_error() {
        let err = GenerationError::RepairExhausted {
            step: "outline".into(),
            attempts: 1,
            last_error: SchemaError::new("missing field `sections`"),
        };
        let msg = err.to_string();
        assert!(msg.contains("outline"));
        assert!(msg.contains("1 repair attempt"));
        assert!(msg.contains("missing field `sections`"));
    }

    #[test]
    fn schema_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let schema: SchemaError = serde_err.into();
        assert!(!schema.message.is_empty());
    }
}
