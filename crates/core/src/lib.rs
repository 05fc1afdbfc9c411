//! # Surveyor Core
//!
//! Domain types, traits, and error definitions for the Surveyor review
//! synthesizer. This crate has **no I/O and no framework dependencies**: it
//! defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the synthesis pipeline is a trait here:
//! - [`Provider`]: the language model (chat completion + embeddings)
//! - [`Tokenizer`]: token counting consistent with the target model
//! - [`SimilaritySearch`]: ranked retrieval of sub-document chunks
//! - [`CorpusLoader`]: the source of [`SourceRecord`]s for a query
//!
//! Implementations live in their own crates.

pub mod corpus;
pub mod document;
pub mod error;
pub mod message;
pub mod provider;
pub mod search;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use corpus::{CitationId, Corpus, CorpusLoader, SourceRecord};
pub use document::{Outline, Overview, Section};
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use search::{SimilaritySearch, TextSplit};
pub use tokenizer::Tokenizer;
