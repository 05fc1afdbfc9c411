//! Structured generation step: render a template, call the model, parse the
//! reply against a target shape, and repair once on a parse failure.
//!
//! # Repair policy
//!
//! A reply that fails to parse is a [`SchemaError`]. The step then makes a
//! bounded number of corrective calls (one by default). Each repair sends the
//! original prompt, the rejected reply, and the parse error, asking for a
//! corrected reply. When the last repair also fails the step fails with
//! [`GenerationError::RepairExhausted`]. A reply that parses on the first
//! call never reaches the repair path.
//!
//! Provider errors and cancellation are not repaired or retried.

use crate::prompts::REPAIR_TEMPLATE;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use surveyor_core::error::{Error, GenerationError, SchemaError};
use surveyor_core::{Message, Outline, Overview, Provider, ProviderRequest, ProviderResponse, Section, Usage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Templates ─────────────────────────────────────────────────────────────

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("placeholder pattern is valid"));

/// A system + human prompt pair with `{name}` placeholders.
///
/// Only `{identifier}` sequences are placeholders; any other brace is kept
/// literally. Substitution is single-pass, so bound values are never
/// re-scanned.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub human: String,
}

/// Placeholder values for one rendering.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to the display form of `value`.
    pub fn with(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }

    /// Placeholder names in order of first appearance (system, then human).
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        for text in [&self.system, &self.human] {
            for caps in PLACEHOLDER.captures_iter(text) {
                let name = &caps[1];
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Render into `[system, human]` messages.
    pub fn render(&self, step: &str, bindings: &Bindings) -> Result<Vec<Message>, GenerationError> {
        Ok(vec![
            Message::system(substitute(&self.system, step, bindings)?),
            Message::user(substitute(&self.human, step, bindings)?),
        ])
    }
}

fn substitute(text: &str, step: &str, bindings: &Bindings) -> Result<String, GenerationError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        let value = bindings.get(name).ok_or_else(|| GenerationError::UnboundPlaceholder {
            step: step.to_string(),
            placeholder: name.to_string(),
        })?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

// ── Target shapes ─────────────────────────────────────────────────────────

/// A value a generation step can produce from raw model text.
pub trait StructuredOutput: Sized {
    /// Description of the expected reply, placed in the prompt.
    fn format_instructions() -> String;

    /// Parse and validate a raw reply.
    fn parse(raw: &str) -> Result<Self, SchemaError>;
}

impl StructuredOutput for Overview {
    fn format_instructions() -> String {
        json_instructions(
            r#"{
  "title": "title of the systematic review",
  "main_points": ["main point (about 30 words)", "..."],
  "overview": "overview of the systematic review"
}"#,
        )
    }

    fn parse(raw: &str) -> Result<Self, SchemaError> {
        let overview: Overview = serde_json::from_str(extract_json(raw)?)?;
        if overview.title.trim().is_empty() {
            return Err(SchemaError::new("`title` must not be empty"));
        }
        if overview.main_points.iter().all(|p| p.trim().is_empty()) {
            return Err(SchemaError::new("`main_points` must contain at least one point"));
        }
        Ok(overview)
    }
}

impl StructuredOutput for Outline {
    fn format_instructions() -> String {
        json_instructions(
            r#"{
  "sections": [
    {
      "title": "title of this section",
      "description": "brief description of this section (about 30 words)",
      "citation_ids": [1, 2],
      "children": [ /* subsections with the same shape, or [] */ ]
    }
  ],
  "citation_ids": [1, 2, 3]
}
`citation_ids` of a section lists the papers it cites; the top-level
`citation_ids` lists every paper cited anywhere in the review."#,
        )
    }

    fn parse(raw: &str) -> Result<Self, SchemaError> {
        fn check(sections: &[Section], path: &str) -> Result<(), SchemaError> {
            for (i, section) in sections.iter().enumerate() {
                let here = format!("{path}[{i}]");
                if section.title.trim().is_empty() {
                    return Err(SchemaError::new(format!("{here}.title must not be empty")));
                }
                check(&section.children, &format!("{here}.children"))?;
            }
            Ok(())
        }

        let outline: Outline = serde_json::from_str(extract_json(raw)?)?;
        if outline.sections.is_empty() {
            return Err(SchemaError::new("`sections` must contain at least one section"));
        }
        check(&outline.sections, "sections")?;
        Ok(outline)
    }
}

/// The markdown body of one generated section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBody(pub String);

impl StructuredOutput for SectionBody {
    fn format_instructions() -> String {
        "Reply with the markdown text of the section only.".to_string()
    }

    fn parse(raw: &str) -> Result<Self, SchemaError> {
        let body = strip_fence(raw.trim(), "markdown").trim();
        if body.is_empty() {
            return Err(SchemaError::new("the section text is empty"));
        }
        Ok(Self(body.to_string()))
    }
}

fn json_instructions(shape: &str) -> String {
    format!(
        "Reply with a single JSON object of the following shape and nothing else:\n```json\n{shape}\n```"
    )
}

/// Locate the outermost JSON object in a reply that may wrap it in a code
/// fence or surrounding prose.
pub fn extract_json(raw: &str) -> Result<&str, SchemaError> {
    let text = strip_fence(raw.trim(), "json");
    let start = text
        .find('{')
        .ok_or_else(|| SchemaError::new("no JSON object found in the reply"))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    Err(SchemaError::new("the JSON object in the reply is not closed"))
}

/// Contents of a fenced code block when the whole reply is one.
fn strip_fence<'a>(text: &'a str, lang: &str) -> &'a str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix(lang).unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

// ── The step ──────────────────────────────────────────────────────────────

/// Model parameters shared by every step of a run.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Corrective calls allowed after a schema failure.
    pub repair_attempts: u32,
}

/// Accounting for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    /// Model calls made, repairs included.
    pub calls: u32,
    pub repairs: u32,
    /// Summed over every call.
    pub usage: Usage,
}

#[derive(Debug, Clone)]
pub struct StepOutcome<T> {
    pub value: T,
    pub stats: StepStats,
}

pub struct StructuredStep<'a> {
    provider: &'a dyn Provider,
    settings: &'a GenerationSettings,
    cancel: &'a CancellationToken,
}

impl<'a> StructuredStep<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        settings: &'a GenerationSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            settings,
            cancel,
        }
    }

    /// Run the step named `step` to completion.
    pub async fn run<T: StructuredOutput>(
        &self,
        step: &str,
        template: &PromptTemplate,
        bindings: &Bindings,
    ) -> Result<StepOutcome<T>, Error> {
        let prompt = template.render(step, bindings)?;
        let mut stats = StepStats::default();

        let mut raw = self.call(step, prompt.clone(), &mut stats).await?;
        let mut last_error = match T::parse(&raw) {
            Ok(value) => return Ok(StepOutcome { value, stats }),
            Err(e) => e,
        };

        for attempt in 1..=self.settings.repair_attempts {
            warn!(step, attempt, error = %last_error, "Reply did not fit its schema, requesting a repair");
            stats.repairs += 1;

            let messages = repair_messages(&prompt, &raw, &last_error);
            raw = self.call(step, messages, &mut stats).await?;
            match T::parse(&raw) {
                Ok(value) => {
                    info!(step, attempt, "Repaired reply accepted");
                    return Ok(StepOutcome { value, stats });
                }
                Err(e) => last_error = e,
            }
        }

        Err(GenerationError::RepairExhausted {
            step: step.to_string(),
            attempts: self.settings.repair_attempts,
            last_error,
        }
        .into())
    }

    async fn call(&self, step: &str, messages: Vec<Message>, stats: &mut StepStats) -> Result<String, Error> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stop: Vec::new(),
        };

        debug!(step, provider = self.provider.name(), model = %request.model, "Calling model");

        let response: ProviderResponse = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            result = self.provider.complete(request) => result?,
        };

        stats.calls += 1;
        let usage = response.usage.unwrap_or_default();
        stats.usage.add(&usage);
        info!(
            step,
            model = %response.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "LLM utilization"
        );

        Ok(response.message.content)
    }
}

/// The original prompt, the rejected reply, then the correction request.
fn repair_messages(prompt: &[Message], raw: &str, error: &SchemaError) -> Vec<Message> {
    let mut messages = prompt.to_vec();
    messages.push(Message::assistant(raw));
    messages.push(Message::user(REPAIR_TEMPLATE.replace("{error}", &error.message)));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, StalledProvider};
    use surveyor_core::Role;

    const VALID_OVERVIEW: &str =
        r#"{"title": "LLM Agents", "main_points": ["Motivation"], "overview": "A survey."}"#;

    fn settings(repair_attempts: u32) -> GenerationSettings {
        GenerationSettings {
            model: "mock-model".into(),
            temperature: 0.0,
            max_tokens: None,
            repair_attempts,
        }
    }

    fn template() -> PromptTemplate {
        PromptTemplate::new("You study {categories}.", "Summarize {query}.")
    }

    fn bindings() -> Bindings {
        Bindings::new().with("categories", "Robotics").with("query", "agents")
    }

    #[test]
    fn render_substitutes_placeholders() {
        let messages = template().render("overview", &bindings()).unwrap();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You study Robotics.");
        assert_eq!(messages[1].content, "Summarize agents.");
    }

    #[test]
    fn non_identifier_braces_stay_literal() {
        let template = PromptTemplate::new("", "Shape: {\"a\": 1} for {query} {Not} {}");
        let messages = template.render("s", &bindings()).unwrap();
        assert_eq!(messages[1].content, "Shape: {\"a\": 1} for agents {Not} {}");
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let bindings = Bindings::new().with("categories", "{query}").with("query", "x");
        let messages = template().render("s", &bindings).unwrap();
        assert_eq!(messages[0].content, "You study {query}.");
    }

    #[test]
    fn unbound_placeholder_is_an_error() {
        let err = template()
            .render("outline", &Bindings::new().with("query", "q"))
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::UnboundPlaceholder { ref placeholder, .. } if placeholder == "categories"
        ));
    }

    #[test]
    fn placeholders_listed_once_in_order() {
        let template = PromptTemplate::new("{a} {b}", "{b} {c_2}");
        assert_eq!(template.placeholders(), vec!["a", "b", "c_2"]);
    }

    #[test]
    fn extract_json_from_fence_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```").unwrap(), "{\"a\": 1}");
        assert_eq!(
            extract_json("Sure! Here it is: {\"a\": {\"b\": \"}\"}} Hope it helps.").unwrap(),
            "{\"a\": {\"b\": \"}\"}}"
        );
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("{\"a\": 1").is_err());
    }

    #[test]
    fn overview_semantic_validation() {
        assert!(Overview::parse(VALID_OVERVIEW).is_ok());
        let err = Overview::parse(r#"{"title": " ", "main_points": ["x"], "overview": ""}"#).unwrap_err();
        assert!(err.message.contains("title"));
        let err = Overview::parse(r#"{"title": "T", "main_points": [], "overview": ""}"#).unwrap_err();
        assert!(err.message.contains("main_points"));
    }

    #[test]
    fn outline_validation_names_the_bad_node() {
        let err = Outline::parse(
            r#"{"sections": [{"title": "A", "children": [{"title": ""}]}], "citation_ids": []}"#,
        )
        .unwrap_err();
        assert!(err.message.contains("sections[0].children[0].title"));
        assert!(Outline::parse(r#"{"sections": [], "citation_ids": []}"#).is_err());
    }

    #[test]
    fn section_body_strips_markdown_fence() {
        let body = SectionBody::parse("```markdown\n## Intro\nText [^1].\n```").unwrap();
        assert_eq!(body.0, "## Intro\nText [^1].");
        assert!(SectionBody::parse("  \n ").is_err());
    }

    #[tokio::test]
    async fn valid_reply_never_invokes_repair() {
        let provider = SequentialMockProvider::from_texts(&[VALID_OVERVIEW]);
        let settings = settings(1);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let outcome = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap();
        assert_eq!(outcome.value.title, "LLM Agents");
        assert_eq!(outcome.stats.calls, 1);
        assert_eq!(outcome.stats.repairs, 0);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn one_repair_recovers_invalid_reply() {
        let provider = SequentialMockProvider::from_texts(&["not json at all", VALID_OVERVIEW]);
        let settings = settings(1);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let outcome = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap();
        assert_eq!(outcome.stats.calls, 2);
        assert_eq!(outcome.stats.repairs, 1);
        assert_eq!(outcome.stats.usage.total_tokens, 30);

        // The repair call carries the prompt, the rejected reply and the error
        let requests = provider.requests();
        let repair = &requests[1].messages;
        assert_eq!(repair.len(), 4);
        assert_eq!(repair[0].content, "You study Robotics.");
        assert_eq!(repair[2].role, Role::Assistant);
        assert_eq!(repair[2].content, "not json at all");
        assert!(repair[3].content.contains("no JSON object found"));
    }

    #[tokio::test]
    async fn second_failure_is_fatal() {
        let provider = SequentialMockProvider::from_texts(&["{}", "still {} wrong"]);
        let settings = settings(1);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let err = step
            .run::<Overview>("overview", &template(), &bindings())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Generation(GenerationError::RepairExhausted { attempts: 1, .. })
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn repair_count_is_configurable() {
        let provider = SequentialMockProvider::from_texts(&["x", "y", "z", VALID_OVERVIEW]);
        let settings = settings(3);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let outcome = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap();
        assert_eq!(outcome.stats.repairs, 3);

        // Each repair replaces the rejected reply rather than accumulating
        let requests = provider.requests();
        assert_eq!(requests[3].messages.len(), 4);
        assert_eq!(requests[3].messages[2].content, "z");
    }

    #[tokio::test]
    async fn zero_repairs_fails_on_first_invalid_reply() {
        let provider = SequentialMockProvider::from_texts(&["nope"]);
        let settings = settings(0);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let err = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap_err();
        assert_eq!(err.kind(), "generation");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_without_retry() {
        let provider = StalledProvider;
        let settings = settings(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let err = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn provider_errors_are_not_repaired() {
        let provider = SequentialMockProvider::new(vec![]);
        let settings = settings(1);
        let cancel = CancellationToken::new();
        let step = StructuredStep::new(&provider, &settings, &cancel);

        let err = step.run::<Overview>("overview", &template(), &bindings()).await.unwrap_err();
        assert!(err.is_external());
        assert_eq!(provider.call_count(), 0);
    }
}
