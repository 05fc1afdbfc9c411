//! Outline tree flattener and table-of-contents rendering.
//!
//! The outline is an owned tree. Generation and assembly walk it as a flat
//! pre-order sequence in which every node carries its markdown heading level.

use regex_lite::Regex;
use std::sync::LazyLock;
use surveyor_core::{Outline, Section};

/// Indentation per nesting depth in the rendered listing.
const INDENT: &str = "    ";

/// `<indent><n>. <title>: <description>`; the description may be absent.
static LISTING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)(\d+)\. (.*?)(?:: |:$|$)").expect("listing line pattern is valid")
});

/// One node of the outline in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenedSection<'o> {
    pub section: &'o Section,
    /// Markdown heading level (`base_level + depth`).
    pub level: usize,
    /// Position in the flattened sequence, from 0.
    pub index: usize,
}

impl FlattenedSection<'_> {
    /// `#` repeated `level` times.
    pub fn heading_marker(&self) -> String {
        "#".repeat(self.level)
    }
}

/// Pre-order traversal: a node, then each of its children in order.
///
/// Top-level sections get `base_level`; every nesting adds one.
pub fn flatten(outline: &Outline, base_level: usize) -> Vec<FlattenedSection<'_>> {
    fn visit<'o>(sections: &'o [Section], level: usize, out: &mut Vec<FlattenedSection<'o>>) {
        for section in sections {
            out.push(FlattenedSection {
                section,
                level,
                index: out.len(),
            });
            visit(&section.children, level + 1, out);
        }
    }

    let mut out = Vec::with_capacity(outline.node_count());
    visit(&outline.sections, base_level, &mut out);
    out
}

/// Numbered, indented listing of the outline, one node per line:
///
/// ```text
/// 1. Introduction: Why agents matter
/// 2. Methods: How they are built
///     1. Planning: ...
/// ```
///
/// Indentation is four spaces per depth and numbering restarts at 1 in each
/// sibling group. Used as prompt context and as the table of contents.
pub fn render_outline(outline: &Outline) -> String {
    fn visit(sections: &[Section], depth: usize, lines: &mut Vec<String>) {
        for (i, section) in sections.iter().enumerate() {
            lines.push(format!(
                "{}{}. {}: {}",
                INDENT.repeat(depth),
                i + 1,
                one_line(&section.title),
                one_line(&section.description)
            ));
            visit(&section.children, depth + 1, lines);
        }
    }

    let mut lines = Vec::new();
    visit(&outline.sections, 0, &mut lines);
    lines.join("\n")
}

/// Recover `(depth, title)` pairs from a [`render_outline`] listing.
///
/// Titles are read up to the first `": "`, so a title that itself contains
/// `": "` comes back truncated there.
pub fn parse_outline_listing(listing: &str) -> Vec<(usize, String)> {
    listing
        .lines()
        .filter_map(|line| LISTING_LINE.captures(line))
        .map(|caps| (caps[1].len() / INDENT.len(), caps[3].to_string()))
        .collect()
}

/// `(depth, title)` for every node in pre-order; the comparison target for
/// [`parse_outline_listing`].
pub fn outline_titles(outline: &Outline) -> Vec<(usize, String)> {
    flatten(outline, 0)
        .into_iter()
        .map(|f| (f.level, one_line(&f.section.title)))
        .collect()
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str, children: Vec<Section>) -> Section {
        Section {
            title: title.into(),
            description: format!("About {}", title.to_lowercase()),
            citation_ids: vec![],
            children,
        }
    }

    fn sample() -> Outline {
        Outline {
            sections: vec![
                section("Introduction", vec![section("Background", vec![])]),
                section(
                    "Methods",
                    vec![
                        section("Planning", vec![section("Tree search", vec![])]),
                        section("Tool use", vec![]),
                    ],
                ),
                section("Conclusion", vec![]),
            ],
            citation_ids: vec![],
        }
    }

    #[test]
    fn child_follows_its_parent() {
        let outline = Outline {
            sections: vec![section("A", vec![section("A.1", vec![])]), section("B", vec![])],
            citation_ids: vec![],
        };
        let flat = flatten(&outline, 2);
        let titles: Vec<_> = flat.iter().map(|f| f.section.title.as_str()).collect();
        let levels: Vec<_> = flat.iter().map(|f| f.level).collect();
        assert_eq!(titles, vec!["A", "A.1", "B"]);
        assert_eq!(levels, vec![2, 3, 2]);
    }

    #[test]
    fn two_top_level_then_nested_child_yields_levels_2_2_3() {
        let outline = Outline {
            sections: vec![section("A", vec![]), section("B", vec![section("B.1", vec![])])],
            citation_ids: vec![],
        };
        let levels: Vec<_> = flatten(&outline, 2).iter().map(|f| f.level).collect();
        assert_eq!(levels, vec![2, 2, 3]);
    }

    #[test]
    fn flattening_is_complete_and_preorder() {
        let outline = sample();
        let flat = flatten(&outline, 2);
        assert_eq!(flat.len(), outline.node_count());

        let titles: Vec<_> = flat.iter().map(|f| f.section.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Introduction", "Background", "Methods", "Planning", "Tree search", "Tool use", "Conclusion"]
        );
        let indices: Vec<_> = flat.iter().map(|f| f.index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
        assert_eq!(flat[4].level, 4);
        assert_eq!(flat[4].heading_marker(), "####");
    }

    #[test]
    fn base_level_shifts_every_heading() {
        let outline = sample();
        let flat = flatten(&outline, 1);
        assert_eq!(flat[0].level, 1);
        assert_eq!(flat[1].level, 2);
    }

    #[test]
    fn empty_outline_flattens_to_nothing() {
        let outline = Outline {
            sections: vec![],
            citation_ids: vec![],
        };
        assert!(flatten(&outline, 2).is_empty());
        assert!(render_outline(&outline).is_empty());
    }

    #[test]
    fn listing_indents_and_restarts_numbering() {
        let listing = render_outline(&sample());
        let expected = "\
1. Introduction: About introduction
    1. Background: About background
2. Methods: About methods
    1. Planning: About planning
        1. Tree search: About tree search
    2. Tool use: About tool use
3. Conclusion: About conclusion";
        assert_eq!(listing, expected);
    }

    #[test]
    fn listing_round_trips_titles_and_depths() {
        let outline = sample();
        let parsed = parse_outline_listing(&render_outline(&outline));
        assert_eq!(parsed, outline_titles(&outline));
    }

    #[test]
    fn multiline_descriptions_stay_on_one_line() {
        let mut outline = sample();
        outline.sections[0].description = "First line\nsecond line".into();
        let listing = render_outline(&outline);
        assert!(listing.starts_with("1. Introduction: First line second line\n"));
        assert_eq!(parse_outline_listing(&listing).len(), outline.node_count());
    }

    #[test]
    fn listing_lines_without_description_parse() {
        let parsed = parse_outline_listing("1. Introduction:\n    2. Scope\n\nnot a node\n3. Outlook: later: maybe");
        assert_eq!(
            parsed,
            vec![
                (0, "Introduction".to_string()),
                (1, "Scope".to_string()),
                (0, "Outlook".to_string()),
            ]
        );
    }
}
