//! Similarity-search and corpus-loading implementations for Surveyor.

pub mod corpus_file;
pub mod in_memory;
pub mod noop;
pub mod splitter;
pub mod vector;

pub use corpus_file::JsonCorpusLoader;
pub use in_memory::InMemoryIndex;
pub use noop::NoopIndex;
pub use splitter::TextSplitter;
pub use vector::{cosine_similarity, rank_by_similarity};
