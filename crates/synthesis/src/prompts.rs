//! Prompt templates for the three generation steps.
//!
//! Placeholders use `{name}` and are bound by the pipeline; see
//! [`PromptTemplate`] for the substitution rules.

use crate::structured::PromptTemplate;

const PERSONA: &str = "You are a research scientist interested in {categories}. \
You are working on writing a systematic review regarding \"{query}\".";

const OVERVIEW_HUMAN: &str = r#"Write an overview of the systematic review based on the summary of the following list of paper abstracts.

-----
{abstracts}
-----

This overview should serve as a compass for you as you construct the outline of the systematic review and write down its details.

Assume that the readers of this systematic review are not familiar with the field. To make it easy for them to follow, list the main points briefly (approximately 30 words maximum each) based on the following points.

- Motivation for this field and the problem this field is trying to solve
- Historical background of this field
- Future development of this field

Based on these main points, provide an overview of the systematic review regarding {query} you will write.

Finally, write the title of the systematic review you are going to write based on this overview.

{format_instructions}"#;

const OUTLINE_HUMAN: &str = r#"Build an outline of the systematic review regarding "{query}" based on the following list of paper abstracts.

-----
{abstracts}
-----

The following is an overview of this systematic review. Build the outline of the systematic review according to this overview.

-----
{overview}
-----

Support each section of this outline by citing the paper abstracts above by their citation_id.
The first section should be titled "Introduction" and the last section should be titled "Conclusion".
Dividing sections into child sections is preferred. Each section can have up to two child sections.

{format_instructions}"#;

const SECTION_SYSTEM_SUFFIX: &str = "

The outline of the systematic review is as follows:

-----
Title: {title}
{outline}";

const SECTION_HUMAN: &str = r#"Write the "{section_title}" section of this systematic review based on the following list of snippets or abstracts of related papers.

-----
{snippets}
-----

This systematic review should adhere to the following overview:

{overview}

Write the "{section_title}" section with respect to this overview. Write the text in markdown format. The title of this section should be a level {section_level} markdown heading (`{md_title_suffix}`). The text of the section should be based on the snippets or abstracts and should be clearly cited. Write each citation at the end of its sentence in the form `[^citation_id]`, using only the citation_id values listed above.

{format_instructions}"#;

/// Follow-up sent after a reply failed to parse; `{error}` is the parse error.
pub const REPAIR_TEMPLATE: &str = "Above, your reply did not satisfy the constraints given in the prompt.
Details: {error}
Please try again. Reply with the corrected output only.";

/// Binds `categories`, `query`, `abstracts`, `format_instructions`.
pub fn overview_template() -> PromptTemplate {
    PromptTemplate::new(PERSONA, OVERVIEW_HUMAN)
}

/// Binds `categories`, `query`, `abstracts`, `overview`, `format_instructions`.
pub fn outline_template() -> PromptTemplate {
    PromptTemplate::new(PERSONA, OUTLINE_HUMAN)
}

/// Binds `categories`, `query`, `title`, `outline`, `section_title`,
/// `snippets`, `overview`, `section_level`, `md_title_suffix`,
/// `format_instructions`.
pub fn section_template() -> PromptTemplate {
    PromptTemplate::new(format!("{PERSONA}{SECTION_SYSTEM_SUFFIX}"), SECTION_HUMAN)
}
