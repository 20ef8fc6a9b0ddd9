//! Per-line icon marker reconciliation against resolved assessments.

use anyhow::Result;
use serde::Serialize;

use crate::assessment::{ArticleAssessment, RedirectResolver, TalkPageProvider, resolve};
use crate::lines::{Line, line_is_list_item, next_line};
use crate::markup::{MarkupNode, MarkupTree, Template};

/// Inline templates rendering an item's assessment next to it.
pub const ICON_TEMPLATE_ALIASES: &[&str] = &["icon"];

/// Historical-status values the class overwrite must never clobber.
const PROTECTED_STATUS_VALUES: &[&str] = &["dga", "ffa", "ffac"];

const DELISTED_GA_STATUS: &str = "dga";
const FORMER_FA_STATUS: &str = "ffa";
const SENTINEL_TEMPLATE_NAME: &str = "Icon";

/// Link prefixes that never name a listed article.
const EXCLUDED_LINK_PREFIXES: &[&str] = &[
    "wikipedia:",
    "wp:",
    "talk:",
    "user:",
    "user talk:",
    "template:",
    "category:",
    "file:",
    "image:",
    "portal:",
    "help:",
    "special:",
];

pub fn is_icon_template(template: &Template) -> bool {
    ICON_TEMPLATE_ALIASES
        .iter()
        .any(|alias| template.name_matches(alias))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IconReport {
    pub items_seen: usize,
    pub lookups: usize,
    pub icons_updated: usize,
    pub sentinels_removed: usize,
    pub sentinels_inserted: usize,
}

/// Walk every list-item line, resolve the linked article's assessment and
/// bring the line's icon markers in agreement with it. Running this twice
/// over the same tree leaves the second pass with nothing to do.
pub fn reconcile_icons<S>(tree: &mut MarkupTree, source: &mut S) -> Result<IconReport>
where
    S: TalkPageProvider + RedirectResolver,
{
    let mut report = IconReport::default();
    let mut cursor = 0usize;
    while let Some(line) = next_line(tree, cursor) {
        cursor = line.end + 1;
        if !line_is_list_item(tree, line) {
            continue;
        }
        report.items_seen += 1;
        let Some(target) = primary_link_target(tree, line) else {
            continue;
        };
        if is_excluded_target(&target) {
            continue;
        }
        let assessment = resolve(&target, source)?;
        report.lookups += 1;
        let delta = reconcile_line(tree, line, &assessment, &mut report);
        cursor = cursor.saturating_add_signed(delta);
    }
    Ok(report)
}

/// The first link on the line whose raw parts carry no nested markup
/// delimiters; guards against decorative links baked into other constructs.
fn primary_link_target(tree: &MarkupTree, line: Line) -> Option<String> {
    for index in line.start..line.end {
        let MarkupNode::Link(link) = tree.node(index) else {
            continue;
        };
        if contains_markup_delimiters(&link.target) {
            continue;
        }
        if link
            .display
            .as_deref()
            .is_some_and(contains_markup_delimiters)
        {
            continue;
        }
        let target = link.target.trim();
        if !target.is_empty() {
            return Some(target.to_string());
        }
    }
    None
}

fn contains_markup_delimiters(value: &str) -> bool {
    value.contains(['{', '}', '[', ']'])
}

fn is_excluded_target(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    EXCLUDED_LINK_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

struct IconScan {
    first: Option<usize>,
    delisted_ga: Option<usize>,
    former_fa: Option<usize>,
}

fn scan_icons(tree: &MarkupTree, start: usize, end: usize) -> IconScan {
    let mut scan = IconScan {
        first: None,
        delisted_ga: None,
        former_fa: None,
    };
    for index in start..end {
        let MarkupNode::Template(template) = tree.node(index) else {
            continue;
        };
        if !is_icon_template(template) {
            continue;
        }
        if scan.first.is_none() {
            scan.first = Some(index);
        }
        let status = icon_status(template);
        if status == DELISTED_GA_STATUS && scan.delisted_ga.is_none() {
            scan.delisted_ga = Some(index);
        }
        if status == FORMER_FA_STATUS && scan.former_fa.is_none() {
            scan.former_fa = Some(index);
        }
    }
    scan
}

fn icon_status(template: &Template) -> String {
    template
        .get("1")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Mutate one line's markers to match `assessment`. Returns the node-count
/// delta so the caller can keep its cursor aligned.
fn reconcile_line(
    tree: &mut MarkupTree,
    line: Line,
    assessment: &ArticleAssessment,
    report: &mut IconReport,
) -> isize {
    let mut end = line.end;
    let mut delta = 0isize;

    // Overwrite the first marker's class; capitalisation-only differences
    // and protected historical values stay untouched.
    let scan = scan_icons(tree, line.start, end);
    if let Some(first) = scan.first
        && let MarkupNode::Template(template) = tree.node_mut(first)
    {
        let current = icon_status(template);
        if current != assessment.class && !PROTECTED_STATUS_VALUES.contains(&current.as_str()) {
            template.set("1", &assessment.class);
            report.icons_updated += 1;
        }
    }

    // Drop sentinels once the article regained the corresponding status.
    let scan = scan_icons(tree, line.start, end);
    let mut removals = Vec::new();
    if assessment.class == "ga"
        && let Some(index) = scan.delisted_ga
    {
        removals.push(index);
    }
    if assessment.class == "fa"
        && let Some(index) = scan.former_fa
    {
        removals.push(index);
    }
    removals.sort_unstable();
    for index in removals.into_iter().rev() {
        tree.remove(index);
        end -= 1;
        delta -= 1;
        report.sentinels_removed += 1;
    }

    // Insert sentinels the resolved history implies but the line lacks,
    // directly after the first marker.
    for status in [DELISTED_GA_STATUS, FORMER_FA_STATUS] {
        let wanted = match status {
            DELISTED_GA_STATUS => assessment.is_delisted_good_article,
            _ => assessment.is_former_featured_article,
        };
        if !wanted {
            continue;
        }
        let scan = scan_icons(tree, line.start, end);
        let present = match status {
            DELISTED_GA_STATUS => scan.delisted_ga.is_some(),
            _ => scan.former_fa.is_some(),
        };
        if present {
            continue;
        }
        let Some(first) = scan.first else { continue };
        tree.insert(first + 1, sentinel_marker(status));
        end += 1;
        delta += 1;
        report.sentinels_inserted += 1;
    }

    delta
}

fn sentinel_marker(status: &str) -> MarkupNode {
    let mut template = Template::new(SENTINEL_TEMPLATE_NAME);
    template.push_positional(status);
    MarkupNode::Template(template)
}
