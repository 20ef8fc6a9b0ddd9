//! Article quality assessment, resolved from talk-page banner templates.

use anyhow::Result;
use serde::Serialize;

use crate::markup::MarkupTree;

/// Known assessment classes, highest quality first. Labels outside this
/// table rank below everything in it.
pub const ASSESSMENT_ORDER: &[&str] = &[
    "fa",
    "fl",
    "a",
    "ga",
    "bplus",
    "b",
    "c",
    "start",
    "stub",
    "dab",
    "list",
    "unassessed",
];

/// Rank for labels not in [`ASSESSMENT_ORDER`]; sorts after every known one.
pub const UNKNOWN_RANK: usize = 255;

const DELISTED_GA_ALIASES: &[&str] = &["delistedga", "dga"];
const ARTICLE_HISTORY_ALIASES: &[&str] = &["article history", "articlehistory"];
const DELISTED_GA_STATUS: &str = "dga";
const FORMER_FA_STATUS: &str = "ffa";
const DISAMBIGUATION_PROJECT_MARKER: &str = "WikiProject Disambiguation";

pub fn rank(label: &str) -> usize {
    ASSESSMENT_ORDER
        .iter()
        .position(|known| *known == label)
        .unwrap_or(UNKNOWN_RANK)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleAssessment {
    pub class: String,
    pub is_delisted_good_article: bool,
    pub is_former_featured_article: bool,
}

impl ArticleAssessment {
    pub fn unassessed() -> Self {
        Self {
            class: "unassessed".to_string(),
            is_delisted_good_article: false,
            is_former_featured_article: false,
        }
    }
}

/// Talk-page text source. `Ok(None)` means the page does not exist, which
/// degrades to an empty page; `Err` is a transport failure and is fatal.
pub trait TalkPageProvider {
    fn get_text(&mut self, title: &str) -> Result<Option<String>>;
}

/// Redirect lookup for mainspace titles. `Ok(None)` means the title is not
/// a redirect.
pub trait RedirectResolver {
    fn target_of(&mut self, title: &str) -> Result<Option<String>>;
}

/// Resolve the best-known assessment for `title` from its talk page.
///
/// Redirects are chased first so the canonical article's talk page is read.
/// Banners carrying an unrecognized or missing `class` are skipped; an
/// article-history template's `currentstatus` overwrites the historical
/// flags outright. With no usable banner at all the class falls back to
/// `dab` or `unassessed`.
pub fn resolve<S>(title: &str, source: &mut S) -> Result<ArticleAssessment>
where
    S: TalkPageProvider + RedirectResolver,
{
    let subject = source
        .target_of(title)?
        .unwrap_or_else(|| title.to_string());
    let talk_title = format!("Talk:{subject}");
    let text = source.get_text(&talk_title)?.unwrap_or_default();
    Ok(resolve_from_talk_text(&text))
}

/// Pure resolution over already-fetched talk text. A talk page that fails
/// to parse is treated like an empty one; the document is someone else's
/// and not ours to reject.
pub fn resolve_from_talk_text(text: &str) -> ArticleAssessment {
    let tree = MarkupTree::parse(text).unwrap_or_default();

    let mut is_delisted_good_article = false;
    let mut is_former_featured_article = false;
    let mut candidates: Vec<String> = Vec::new();

    for template in tree.templates_deep() {
        let name = template.name_lower();
        if DELISTED_GA_ALIASES.contains(&name.as_str()) {
            is_delisted_good_article = true;
            continue;
        }
        if ARTICLE_HISTORY_ALIASES.contains(&name.as_str()) {
            // Authoritative when it carries a current status; a bare
            // article-history banner changes nothing.
            if let Some(status) = template.get("currentstatus") {
                let status = sanitize_label(status);
                is_delisted_good_article = status == DELISTED_GA_STATUS;
                is_former_featured_article = status == FORMER_FA_STATUS;
            }
            continue;
        }
        if let Some(class) = template.get("class") {
            let class = sanitize_label(class);
            if rank(&class) != UNKNOWN_RANK {
                candidates.push(class);
            }
        }
    }

    let class = match best_candidate(&candidates) {
        Some(best) => best.to_string(),
        None if text.contains(DISAMBIGUATION_PROJECT_MARKER) => "dab".to_string(),
        None => "unassessed".to_string(),
    };

    ArticleAssessment {
        class,
        is_delisted_good_article,
        is_former_featured_article,
    }
}

/// Highest-ranked candidate; ties keep the first encountered.
fn best_candidate(candidates: &[String]) -> Option<&str> {
    let mut best: Option<&str> = None;
    for candidate in candidates {
        match best {
            Some(current) if rank(candidate) >= rank(current) => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Drop a trailing inline comment, trim, lower-case.
fn sanitize_label(value: &str) -> String {
    value
        .split("<!")
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
