//! Token counting implementations.
//!
//! [`BpeTokenizer`] matches the target model's byte-pair encoding and is what
//! real runs use. [`HeuristicTokenizer`] assumes ~4 characters per token,
//! which keeps test budgets predictable and works offline.

use surveyor_core::Tokenizer;
use surveyor_core::error::TokenizerError;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base};

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Character-count tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(estimate_tokens(text))
    }
}

/// tiktoken-backed tokenizer for OpenAI-family models.
pub struct BpeTokenizer {
    name: String,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Resolve the encoding for a model name ("gpt-3.5-turbo", "gpt-4o") or
    /// an encoding name ("cl100k_base", "o200k_base").
    pub fn for_model(model_or_encoding: &str) -> Result<Self, TokenizerError> {
        let lower = model_or_encoding.to_ascii_lowercase();

        let bpe = match get_bpe_from_model(&lower) {
            Ok(bpe) => bpe,
            Err(_) => {
                let loaded = match lower.as_str() {
                    "o200k_base" => o200k_base(),
                    "cl100k_base" => cl100k_base(),
                    _ => {
                        return Err(TokenizerError::UnsupportedModel(
                            model_or_encoding.to_string(),
                        ));
                    }
                };
                loaded.map_err(|e| TokenizerError::Failed(format!("load {lower}: {e}")))?
            }
        };

        Ok(Self { name: lower, bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}
