//! Prompt context: token counting and budgeted packing.

pub mod packer;
pub mod token;

pub use packer::{BLOCK_SEPARATOR, PackStats, PackedContext, Packer, render_block, summary_splits};
pub use token::{BpeTokenizer, HeuristicTokenizer, estimate_tokens};
