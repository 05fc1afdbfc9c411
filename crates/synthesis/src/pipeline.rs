//! Section generation orchestrator.
//!
//! Drives one run through a strictly linear state machine:
//!
//! ```text
//! AwaitingOverview → AwaitingOutline → GeneratingSections(i) → Assembling → Done
//! ```
//!
//! Any error aborts the run before a document exists; there is no partial
//! output. With `section_concurrency > 1` sections are generated through an
//! order-preserving buffer, so the assembled order is always document order.

use crate::citations::CitationResolver;
use crate::context::packer::{PackStats, Packer, summary_splits};
use crate::outline::{FlattenedSection, flatten, render_outline};
use crate::prompts::{outline_template, overview_template, section_template};
use crate::structured::{
    Bindings, GenerationSettings, SectionBody, StepStats, StructuredOutput, StructuredStep,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use surveyor_config::AppConfig;
use surveyor_core::error::{Error, Result};
use surveyor_core::{
    CitationId, Corpus, Outline, Overview, Provider, SimilaritySearch, SourceRecord, Tokenizer, Usage,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a run needs from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub generation: GenerationSettings,
    pub overview_token_limit: usize,
    pub outline_token_limit: usize,
    pub section_token_limit: usize,
    /// Heading level of top-level sections.
    pub base_heading_level: usize,
    /// Category tags named in the system prompts.
    pub category_count: usize,
    pub similarity_search_k: usize,
    pub section_concurrency: usize,
    pub warn_on_corpus_fallback: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            generation: GenerationSettings {
                model: config.effective_model().to_string(),
                temperature: config.default_temperature,
                max_tokens: Some(config.default_max_tokens),
                repair_attempts: pipeline.repair_attempts,
            },
            overview_token_limit: pipeline.overview_token_limit,
            outline_token_limit: pipeline.outline_token_limit,
            section_token_limit: pipeline.section_token_limit,
            base_heading_level: pipeline.base_heading_level,
            category_count: pipeline.category_count,
            similarity_search_k: pipeline.similarity_search_k,
            section_concurrency: pipeline.section_concurrency,
            warn_on_corpus_fallback: pipeline.warn_on_corpus_fallback,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ── State machine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    AwaitingOverview,
    AwaitingOutline,
    /// Index of the next section to complete, in document order.
    GeneratingSections(usize),
    Assembling,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingOverview => write!(f, "awaiting_overview"),
            Self::AwaitingOutline => write!(f, "awaiting_outline"),
            Self::GeneratingSections(i) => write!(f, "generating_sections({i})"),
            Self::Assembling => write!(f, "assembling"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Forward-only holder of the current [`PipelineState`].
#[derive(Debug)]
pub struct StateMachine {
    state: PipelineState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PipelineState::AwaitingOverview,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`, which must come strictly after the current state.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if next <= self.state {
            return Err(Error::Internal(format!(
                "illegal pipeline transition {} -> {next}",
                self.state
            )));
        }
        info!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
        Ok(())
    }
}

// ── Results ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StepReport {
    pub stats: StepStats,
    /// Packing of the step's prompt context.
    pub packing: PackStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub index: usize,
    pub title: String,
    pub level: usize,
    pub step: StepReport,
    /// Chunks returned by the similarity search before packing.
    pub retrieved_chunks: usize,
    /// True when the section cited nothing and every record was offered.
    pub used_corpus_fallback: bool,
    /// Ids cited inline by the generated body, first-seen order.
    pub cited: Vec<CitationId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub corpus_size: usize,
    pub overview: StepReport,
    pub outline: StepReport,
    pub sections: Vec<SectionReport>,
}

impl RunReport {
    /// Token usage over every model call of the run.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for step in self.steps() {
            total.add(&step.stats.usage);
        }
        total
    }

    pub fn total_calls(&self) -> u32 {
        self.steps().map(|s| s.stats.calls).sum()
    }

    pub fn total_repairs(&self) -> u32 {
        self.steps().map(|s| s.stats.repairs).sum()
    }

    pub fn fallback_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.used_corpus_fallback).count()
    }

    fn steps(&self) -> impl Iterator<Item = &StepReport> {
        [&self.overview, &self.outline]
            .into_iter()
            .chain(self.sections.iter().map(|s| &s.step))
    }
}

/// The finished review.
#[derive(Debug, Clone)]
pub struct ReviewDocument {
    pub markdown: String,
    pub overview: Overview,
    pub outline: Outline,
    pub report: RunReport,
}

// ── Pipeline ──────────────────────────────────────────────────────────────

pub struct ReviewPipeline {
    provider: Arc<dyn Provider>,
    tokenizer: Arc<dyn Tokenizer>,
    search: Arc<dyn SimilaritySearch>,
    settings: PipelineSettings,
}

/// Values fixed once the outline is accepted, shared by every section.
struct SectionContext<'a> {
    query: &'a str,
    categories: &'a str,
    corpus: &'a Corpus,
    resolver: &'a CitationResolver<'a>,
    overview: &'a Overview,
    overview_text: String,
    outline_listing: String,
    cancel: &'a CancellationToken,
}

struct GeneratedSection {
    body: String,
    report: SectionReport,
}

impl ReviewPipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        tokenizer: Arc<dyn Tokenizer>,
        search: Arc<dyn SimilaritySearch>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            tokenizer,
            search,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Write a review of `query` from `corpus`.
    ///
    /// An empty corpus is allowed: every prompt then carries an empty
    /// context and the reference list is whatever the outline cites (which
    /// must then be nothing).
    pub async fn run(&self, query: &str, corpus: &Corpus, cancel: &CancellationToken) -> Result<ReviewDocument> {
        let mut machine = StateMachine::new();
        let mut report = RunReport {
            corpus_size: corpus.len(),
            ..RunReport::default()
        };
        let resolver = CitationResolver::new(corpus);
        let categories = corpus.categories_summary(self.settings.category_count);
        let step = StructuredStep::new(self.provider.as_ref(), &self.settings.generation, cancel);
        let packer = Packer::new(self.tokenizer.as_ref());

        info!(
            query,
            records = corpus.len(),
            provider = self.provider.name(),
            tokenizer = self.tokenizer.name(),
            index = self.search.name(),
            "Starting review"
        );

        // Overview
        let abstracts = packer.pack(&summary_splits(corpus.records()), self.settings.overview_token_limit)?;
        let bindings = Bindings::new()
            .with("categories", &categories)
            .with("query", query)
            .with("abstracts", &abstracts.text)
            .with("format_instructions", Overview::format_instructions());
        let overview = step.run::<Overview>("overview", &overview_template(), &bindings).await?;
        report.overview = StepReport {
            stats: overview.stats,
            packing: abstracts.stats,
        };
        let overview = overview.value;
        machine.advance(PipelineState::AwaitingOutline)?;

        // Outline
        let abstracts = packer.pack(&summary_splits(corpus.records()), self.settings.outline_token_limit)?;
        let bindings = Bindings::new()
            .with("categories", &categories)
            .with("query", query)
            .with("abstracts", &abstracts.text)
            .with("overview", &overview)
            .with("format_instructions", Outline::format_instructions());
        let outline = step.run::<Outline>("outline", &outline_template(), &bindings).await?;
        report.outline = StepReport {
            stats: outline.stats,
            packing: abstracts.stats,
        };
        let mut outline = outline.value;
        resolver.validate_outline(&outline)?;
        let added = outline.complete_citation_ids();
        if added > 0 {
            debug!(added, "Section citations missing from the outline's list were appended");
        }

        // Sections
        let flat = flatten(&outline, self.settings.base_heading_level);
        machine.advance(PipelineState::GeneratingSections(0))?;

        let ctx = SectionContext {
            query,
            categories: &categories,
            corpus,
            resolver: &resolver,
            overview: &overview,
            overview_text: overview.to_string(),
            outline_listing: render_outline(&outline),
            cancel,
        };

        let mut bodies = Vec::with_capacity(flat.len());
        let mut generated = stream::iter(flat.iter().copied())
            .map(|section| self.generate_section(&ctx, section))
            .buffered(self.settings.section_concurrency.max(1));
        while let Some(section) = generated.next().await {
            let section = section?;
            bodies.push(section.body);
            report.sections.push(section.report);
            if bodies.len() < flat.len() {
                machine.advance(PipelineState::GeneratingSections(bodies.len()))?;
            }
        }
        drop(generated);

        // Assembly
        machine.advance(PipelineState::Assembling)?;
        let cited_inline: Vec<CitationId> = report.sections.iter().flat_map(|s| s.cited.iter().copied()).collect();
        let references = resolver.bibliography(&outline, &cited_inline)?;
        let markdown = assemble(
            &overview,
            &ctx.outline_listing,
            &bodies,
            &references,
            self.settings.base_heading_level,
        );
        machine.advance(PipelineState::Done)?;

        let usage = report.total_usage();
        info!(
            sections = report.sections.len(),
            references = references.len(),
            calls = report.total_calls(),
            repairs = report.total_repairs(),
            fallback_sections = report.fallback_sections(),
            total_tokens = usage.total_tokens,
            "Review complete"
        );

        Ok(ReviewDocument {
            markdown,
            overview,
            outline,
            report,
        })
    }

    async fn generate_section(&self, ctx: &SectionContext<'_>, flat: FlattenedSection<'_>) -> Result<GeneratedSection> {
        let section = flat.section;
        let label = format!("section '{}'", section.title);

        let cited = ctx.resolver.resolve_section(section)?;
        let used_corpus_fallback = cited.is_empty();
        let first_tier: Vec<&SourceRecord> = if used_corpus_fallback {
            if self.settings.warn_on_corpus_fallback && !ctx.corpus.is_empty() {
                warn!(
                    section = %section.title,
                    records = ctx.corpus.len(),
                    "Section cites nothing; offering every record as context"
                );
            }
            ctx.corpus.records().iter().collect()
        } else {
            cited
        };

        let search_query = format!("{} {}", section.title, section.description);
        let retrieved = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            result = self.search.search(search_query.trim(), self.settings.similarity_search_k) => result?,
        };
        let retrieved_chunks = retrieved.len();
        debug!(section = %section.title, retrieved_chunks, "Similar chunks retrieved");

        let mut candidates = summary_splits(first_tier);
        candidates.extend(retrieved);
        let packed = Packer::new(self.tokenizer.as_ref()).pack(&candidates, self.settings.section_token_limit)?;

        let bindings = Bindings::new()
            .with("categories", ctx.categories)
            .with("query", ctx.query)
            .with("title", &ctx.overview.title)
            .with("outline", &ctx.outline_listing)
            .with("section_title", &section.title)
            .with("snippets", &packed.text)
            .with("overview", &ctx.overview_text)
            .with("section_level", flat.level)
            .with("md_title_suffix", flat.heading_marker())
            .with("format_instructions", SectionBody::format_instructions());

        let step = StructuredStep::new(self.provider.as_ref(), &self.settings.generation, ctx.cancel);
        let step_name = format!("section {}", flat.index + 1);
        let outcome = step.run::<SectionBody>(&step_name, &section_template(), &bindings).await?;

        let cited = ctx.resolver.check_inline(&outcome.value.0, &label)?;
        let body = normalize_heading(&outcome.value.0, &section.title, flat.level);

        Ok(GeneratedSection {
            body,
            report: SectionReport {
                index: flat.index,
                title: section.title.clone(),
                level: flat.level,
                step: StepReport {
                    stats: outcome.stats,
                    packing: packed.stats,
                },
                retrieved_chunks,
                used_corpus_fallback,
                cited,
            },
        })
    }
}

/// Give a generated body the heading its outline position calls for.
///
/// A leading markdown heading is re-leveled to `level`; a body without one
/// gets `title` as its heading.
pub fn normalize_heading(body: &str, title: &str, level: usize) -> String {
    let marker = "#".repeat(level);
    let body = body.trim();
    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));

    let hashes = first.bytes().take_while(|b| *b == b'#').count();
    let heading = &first[hashes..];
    if hashes > 0 && (heading.is_empty() || heading.starts_with(' ')) {
        let heading = heading.trim();
        let heading = if heading.is_empty() { title } else { heading };
        if rest.is_empty() {
            format!("{marker} {heading}")
        } else {
            format!("{marker} {heading}\n{rest}")
        }
    } else {
        format!("{marker} {title}\n\n{body}")
    }
}

/// Concatenate the finished document.
pub fn assemble(
    overview: &Overview,
    outline_listing: &str,
    sections: &[String],
    references: &[String],
    base_level: usize,
) -> String {
    let marker = "#".repeat(base_level);
    let mut parts: Vec<&str> = Vec::with_capacity(sections.len() + references.len() + 5);

    let title = format!("# {}", overview.title);
    let toc_heading = format!("{marker} Table of contents");
    let references_heading = format!("{marker} References");

    parts.push(&title);
    parts.push(&overview.overview);
    parts.push(&toc_heading);
    parts.push(outline_listing);
    parts.extend(sections.iter().map(String::as_str));
    parts.push(&references_heading);
    parts.extend(references.iter().map(String::as_str));

    let mut markdown = parts.join("\n\n");
    markdown.push('\n');
    markdown
}
