//! The review synthesis pipeline.
//!
//! A run turns a query and a [`Corpus`](surveyor_core::Corpus) into a
//! markdown systematic review in three generation stages:
//!
//! 1. **Overview**: title, main points and prose, from packed summaries
//! 2. **Outline**: a section tree with citation ids, checked against the corpus
//! 3. **Sections**: one body per outline node, from cited summaries plus
//!    similar chunks, packed under a token budget
//!
//! The pieces are usable on their own: [`Packer`] for budgeted context,
//! [`flatten`] for heading levels, [`CitationResolver`] for citation
//! integrity, [`StructuredStep`] for validate-and-repair generation.

pub mod citations;
pub mod context;
pub mod outline;
pub mod pipeline;
pub mod prompts;
pub mod structured;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use citations::{CitationResolver, inline_citations, reference_line};
pub use context::{BpeTokenizer, HeuristicTokenizer, PackStats, PackedContext, Packer};
pub use outline::{FlattenedSection, flatten, parse_outline_listing, render_outline};
pub use pipeline::{
    PipelineSettings, PipelineState, ReviewDocument, ReviewPipeline, RunReport, SectionReport, StepReport,
};
pub use structured::{Bindings, GenerationSettings, PromptTemplate, StepStats, StructuredOutput, StructuredStep};
