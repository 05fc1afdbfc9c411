//! LLM Provider implementations for Surveyor.
//!
//! All providers implement the `surveyor_core::Provider` trait.
//! The router builds them from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
