//! Tokenizer trait: token counting consistent with the target model.
//!
//! The packer and every budget check use the same instance, so counts are
//! comparable across the whole run.

use crate::error::TokenizerError;

pub trait Tokenizer: Send + Sync {
    /// Tokenizer name for logs (e.g., "cl100k_base", "heuristic").
    fn name(&self) -> &str;

    /// Number of tokens `text` occupies in a prompt.
    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}
