//! Section item recounting, heading rewrites and the grand-total marker.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::icons::is_icon_template;
use crate::lines::{Line, line_is_list_item, lines_within};
use crate::markup::{MarkupNode, MarkupTree, Section};

/// Template whose first parameter carries the grand total.
pub const SUMMARY_MARKER_TEMPLATE: &str = "huge";

const TOTAL_PREFIX: &str = "Total articles";
const MAX_HEADING_DEPTH: u8 = 9;

/// Counted-heading shape: `Title (12 articles)`, `(1 article)` or
/// `(3/10 quota)`, anchored to the end of the heading text so an earlier
/// parenthetical in the title never matches.
static HEADING_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>.*?\(\s*)(?P<count>[0-9][0-9,]*)(?P<denom>/[0-9][0-9,]*)?(?P<gap>\s+)(?P<word>articles?|quota)(?P<suffix>\s*\)\s*)$",
    )
    .expect("heading count pattern")
});

#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionCountReport {
    pub sections_seen: usize,
    pub sections_rewritten: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TotalReport {
    pub depth: Option<u8>,
    pub total: u64,
    pub markers_updated: usize,
}

/// Recount every section and rewrite its heading in place. Headings that do
/// not carry the count pattern are left alone; not every section is a
/// counted list.
pub fn rewrite_section_counts(tree: &mut MarkupTree) -> SectionCountReport {
    let sections = tree.sections(None);
    let mut report = SectionCountReport {
        sections_seen: sections.len(),
        ..SectionCountReport::default()
    };

    for section in &sections {
        let count = count_section_items(tree, section);
        let rewritten = match tree.node(section.heading) {
            MarkupNode::Heading(heading) => rewrite_heading_text(&heading.text, count),
            _ => None,
        };
        let Some(new_text) = rewritten else { continue };
        if let MarkupNode::Heading(heading) = tree.node_mut(section.heading)
            && heading.text != new_text
        {
            heading.text = new_text;
            report.sections_rewritten += 1;
        }
    }
    report
}

/// Sum the freshly rewritten counts at the document's top organizational
/// depth and write `Total articles: N` into the summary marker, keeping an
/// existing `/denominator` suffix.
pub fn update_total_marker(tree: &mut MarkupTree) -> TotalReport {
    for depth in 1..=MAX_HEADING_DEPTH {
        let sections = tree.sections(Some(&[depth]));
        if sections.is_empty() {
            continue;
        }

        let mut total = 0u64;
        for section in &sections {
            if let MarkupNode::Heading(heading) = tree.node(section.heading)
                && let Some(count) = heading_primary_count(&heading.text)
            {
                total += count;
            }
        }

        let mut markers_updated = 0usize;
        for index in tree.template_indices(|template| {
            template.name_matches(SUMMARY_MARKER_TEMPLATE)
        }) {
            let MarkupNode::Template(template) = tree.node_mut(index) else {
                continue;
            };
            let denominator = template
                .get("1")
                .and_then(trailing_denominator)
                .map(str::to_string);
            let value = match denominator {
                Some(denominator) => format!("{TOTAL_PREFIX}: {total}/{denominator}"),
                None => format!("{TOTAL_PREFIX}: {total}"),
            };
            template.set("1", &value);
            markers_updated += 1;
        }

        return TotalReport {
            depth: Some(depth),
            total,
            markers_updated,
        };
    }
    TotalReport::default()
}

/// Items in a section, nested subsections included. Icon-carrying list
/// items are the primary signal; a section with none falls back to bare
/// list markers.
pub fn count_section_items(tree: &MarkupTree, section: &Section) -> usize {
    let mut primary = 0usize;
    let mut secondary = 0usize;
    for line in lines_within(tree, section.body_start(), section.end) {
        if !line_is_list_item(tree, line) {
            continue;
        }
        secondary += 1;
        if line_has_icon_marker(tree, line) {
            primary += 1;
        }
    }
    if primary > 0 { primary } else { secondary }
}

pub fn heading_primary_count(text: &str) -> Option<u64> {
    let captures = HEADING_COUNT_RE.captures(text)?;
    captures["count"].replace(',', "").parse().ok()
}

/// Splice the new count into the heading text, preserving everything the
/// pattern did not capture: title, spacing, denominator, and the literal
/// `quota` keyword. Quota headings keep their word; otherwise the article
/// word agrees in number with the count.
fn rewrite_heading_text(text: &str, count: usize) -> Option<String> {
    let captures = HEADING_COUNT_RE.captures(text)?;
    let word = if &captures["word"] == "quota" {
        "quota"
    } else if count == 1 {
        "article"
    } else {
        "articles"
    };
    Some(format!(
        "{}{}{}{}{}{}",
        &captures["prefix"],
        count,
        captures.name("denom").map(|m| m.as_str()).unwrap_or(""),
        &captures["gap"],
        word,
        &captures["suffix"],
    ))
}

fn line_has_icon_marker(tree: &MarkupTree, line: Line) -> bool {
    (line.start..line.end).any(|index| {
        matches!(tree.node(index), MarkupNode::Template(template) if is_icon_template(template))
    })
}

fn trailing_denominator(value: &str) -> Option<&str> {
    let (_, tail) = value.rsplit_once('/')?;
    let tail = tail.trim_end();
    if !tail.is_empty() && tail.bytes().all(|byte| byte.is_ascii_digit() || byte == b',') {
        Some(tail)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{
        heading_primary_count, rewrite_heading_text, rewrite_section_counts, update_total_marker,
    };
    use crate::markup::MarkupTree;

    #[test]
    fn heading_rewrite_updates_plural_count() {
        assert_eq!(
            rewrite_heading_text(" Foo (5 articles) ", 7),
            Some(" Foo (7 articles) ".to_string())
        );
    }

    #[test]
    fn heading_rewrite_goes_singular_at_one() {
        assert_eq!(
            rewrite_heading_text(" Foo (5 articles) ", 1),
            Some(" Foo (1 article) ".to_string())
        );
        assert_eq!(
            rewrite_heading_text(" Foo (1 article) ", 3),
            Some(" Foo (3 articles) ".to_string())
        );
    }

    #[test]
    fn quota_headings_keep_keyword_and_denominator() {
        assert_eq!(
            rewrite_heading_text(" Foo (3/10 quota) ", 4),
            Some(" Foo (4/10 quota) ".to_string())
        );
        assert_eq!(
            rewrite_heading_text(" Foo (3/10 quota) ", 1),
            Some(" Foo (1/10 quota) ".to_string())
        );
    }

    #[test]
    fn parenthetical_titles_match_the_trailing_count_only() {
        assert_eq!(
            rewrite_heading_text(" Music (theory) (2 articles) ", 9),
            Some(" Music (theory) (9 articles) ".to_string())
        );
    }

    #[test]
    fn unpatterned_headings_are_left_alone() {
        assert_eq!(rewrite_heading_text(" See also ", 3), None);
        assert_eq!(rewrite_heading_text(" Foo (several articles) ", 3), None);
    }

    #[test]
    fn counts_with_thousands_separators_parse() {
        assert_eq!(heading_primary_count(" All (1,001 articles) "), Some(1001));
    }

    #[test]
    fn section_rewrite_counts_icon_items() {
        let raw = "== People (5 articles) ==\n\
# {{Icon|fa}} [[A]]\n\
# {{Icon|b}} [[B]]\n\
# {{Icon|c}} [[C]]\n\
* see also, not an item line but no icon either\n\
== Notes ==\nprose\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        let report = rewrite_section_counts(&mut tree);
        assert_eq!(report.sections_rewritten, 1);
        assert!(tree.serialize().starts_with("== People (3 articles) =="));
    }

    #[test]
    fn plain_lists_fall_back_to_bare_markers() {
        let raw = "== Reading (1 article) ==\n# [[A]]\n# [[B]]\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        rewrite_section_counts(&mut tree);
        assert!(tree.serialize().starts_with("== Reading (2 articles) =="));
    }

    #[test]
    fn nested_items_count_toward_ancestors() {
        let raw = "== All (0 articles) ==\n\
# {{Icon|fa}} [[A]]\n\
=== Sub (0 articles) ===\n\
# {{Icon|b}} [[B]]\n\
# {{Icon|c}} [[C]]\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        rewrite_section_counts(&mut tree);
        let text = tree.serialize();
        assert!(text.contains("== All (3 articles) =="));
        assert!(text.contains("=== Sub (2 articles) ==="));
    }

    #[test]
    fn total_sums_the_shallowest_populated_depth() {
        let raw = "{{huge|Total articles: 0}}\n\
== A (3 articles) ==\n# x\n\
== B (4 articles) ==\n# x\n\
== C (5 articles) ==\n# x\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        let report = update_total_marker(&mut tree);
        assert_eq!(report.depth, Some(2));
        assert_eq!(report.total, 12);
        assert!(tree.serialize().starts_with("{{huge|Total articles: 12}}"));
    }

    #[test]
    fn total_ignores_denominators_in_headings_but_keeps_marker_denominator() {
        let raw = "{{huge|Total articles: 7/1000}}\n\
== A (3/10 quota) ==\n# x\n\
== B (4 articles) ==\n# x\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        let report = update_total_marker(&mut tree);
        assert_eq!(report.total, 7);
        assert!(
            tree.serialize()
                .starts_with("{{huge|Total articles: 7/1000}}")
        );
    }

    #[test]
    fn total_skips_unpatterned_headings_at_depth() {
        let raw = "{{HUGE|placeholder}}\n== A (3 articles) ==\n# x\n== See also ==\ntext\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        let report = update_total_marker(&mut tree);
        assert_eq!(report.total, 3);
        assert_eq!(report.markers_updated, 1);
        assert!(tree.serialize().starts_with("{{HUGE|Total articles: 3}}"));
    }

    #[test]
    fn recount_then_total_sees_rewritten_headings() {
        let raw = "{{huge|Total articles: 0}}\n\
== A (0 articles) ==\n\
# {{Icon|fa}} [[A1]]\n\
# {{Icon|b}} [[A2]]\n\
== B (0 articles) ==\n\
# {{Icon|c}} [[B1]]\n";
        let mut tree = MarkupTree::parse(raw).expect("parse");
        rewrite_section_counts(&mut tree);
        let report = update_total_marker(&mut tree);
        assert_eq!(report.total, 3);
    }
}
