//! Fetch-transform-save cycle for one list page, with the operator shutoff
//! switch and a dry-run mode that reports a diff instead of editing.

use anyhow::{Result, bail};
use serde::Serialize;
use similar::TextDiff;

use crate::assessment::{RedirectResolver, TalkPageProvider};
use crate::client::ListPageApi;
use crate::config::BotConfig;
use crate::counts::{SectionCountReport, TotalReport};
use crate::icons::IconReport;
use crate::transform::{TransformOptions, VitalListTransformer};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub summary: String,
    pub dry_run: bool,
    pub skip_assessment: bool,
}

impl RunOptions {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            summary: config.summary(),
            dry_run: false,
            skip_assessment: config.skip_assessment(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAction {
    Updated,
    DryRun,
    SkippedRedirect,
    SkippedUnchanged,
    SkippedShutoff,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub title: String,
    pub action: RunAction,
    pub diff: Option<String>,
    pub counts: Option<SectionCountReport>,
    pub total: Option<TotalReport>,
    pub icons: Option<IconReport>,
    pub request_count: usize,
}

impl RunReport {
    fn skipped(title: &str, action: RunAction, request_count: usize) -> Self {
        Self {
            title: title.to_string(),
            action,
            diff: None,
            counts: None,
            total: None,
            icons: None,
            request_count,
        }
    }
}

/// The task switch: absent or non-`active` shutoff page text disables the
/// task. Operator-space tasks (negative task number) run unconditionally.
pub fn task_switch_active<A: ListPageApi>(api: &mut A, config: &BotConfig) -> Result<bool> {
    let task_number = config.task_number();
    if task_number < 0 {
        return Ok(true);
    }
    let title = config
        .shutoff_page()
        .replace("{}", &task_number.to_string());
    let text = api.get_page_text(&title)?.unwrap_or_default();
    Ok(text.trim() == "active")
}

/// Run the full update cycle for one page title.
pub fn run_update<A>(
    api: &mut A,
    title: &str,
    config: &BotConfig,
    options: &RunOptions,
) -> Result<RunReport>
where
    A: ListPageApi + TalkPageProvider + RedirectResolver,
{
    if api.is_redirect(title)? {
        let count = api.request_count();
        return Ok(RunReport::skipped(title, RunAction::SkippedRedirect, count));
    }
    let Some(text) = api.get_page_text(title)? else {
        bail!("page does not exist: {title}");
    };

    let outcome = {
        let mut transformer = VitalListTransformer::new(
            api,
            TransformOptions {
                skip_assessment: options.skip_assessment,
            },
        );
        transformer.apply(&text)?
    };

    if outcome.text == text {
        let count = api.request_count();
        return Ok(RunReport {
            counts: Some(outcome.counts),
            total: Some(outcome.total),
            icons: outcome.icons,
            ..RunReport::skipped(title, RunAction::SkippedUnchanged, count)
        });
    }

    if options.dry_run {
        let diff = render_diff(title, &text, &outcome.text);
        return Ok(RunReport {
            title: title.to_string(),
            action: RunAction::DryRun,
            diff: Some(diff),
            counts: Some(outcome.counts),
            total: Some(outcome.total),
            icons: outcome.icons,
            request_count: api.request_count(),
        });
    }

    if !task_switch_active(api, config)? {
        let count = api.request_count();
        return Ok(RunReport::skipped(title, RunAction::SkippedShutoff, count));
    }

    api.edit_page(title, &outcome.text, &options.summary)?;
    Ok(RunReport {
        title: title.to_string(),
        action: RunAction::Updated,
        diff: None,
        counts: Some(outcome.counts),
        total: Some(outcome.total),
        icons: outcome.icons,
        request_count: api.request_count(),
    })
}

fn render_diff(title: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(2)
        .header(title, "updated")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;

    use super::{RunAction, RunOptions, run_update, task_switch_active};
    use crate::assessment::{RedirectResolver, TalkPageProvider};
    use crate::client::ListPageApi;
    use crate::config::BotConfig;

    const LIST_TITLE: &str = "Wikipedia:Vital articles";
    const LIST_PAGE: &str = "{{huge|Total articles: 0}}\n\
== People (9 articles) ==\n\
# {{Icon|b}} [[Ada Lovelace]]\n\
# {{Icon|fa}} [[Alan Turing]]\n";

    #[derive(Default)]
    struct MockWiki {
        pages: BTreeMap<String, String>,
        redirect_pages: Vec<String>,
        edits: Vec<(String, String, String)>,
        request_count: usize,
    }

    impl MockWiki {
        fn seeded() -> Self {
            let mut wiki = Self::default();
            wiki.pages
                .insert(LIST_TITLE.to_string(), LIST_PAGE.to_string());
            wiki.pages.insert(
                "Talk:Ada Lovelace".to_string(),
                "{{WikiProject Test|class=ga}}".to_string(),
            );
            wiki.pages.insert(
                "Talk:Alan Turing".to_string(),
                "{{WikiProject Test|class=fa}}".to_string(),
            );
            wiki
        }
    }

    impl ListPageApi for MockWiki {
        fn get_page_text(&mut self, title: &str) -> Result<Option<String>> {
            self.request_count += 1;
            Ok(self.pages.get(title).cloned())
        }

        fn is_redirect(&mut self, title: &str) -> Result<bool> {
            self.request_count += 1;
            Ok(self.redirect_pages.iter().any(|page| page == title))
        }

        fn edit_page(&mut self, title: &str, text: &str, summary: &str) -> Result<()> {
            self.request_count += 1;
            self.pages.insert(title.to_string(), text.to_string());
            self.edits
                .push((title.to_string(), text.to_string(), summary.to_string()));
            Ok(())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    impl TalkPageProvider for MockWiki {
        fn get_text(&mut self, title: &str) -> Result<Option<String>> {
            self.request_count += 1;
            Ok(self.pages.get(title).cloned())
        }
    }

    impl RedirectResolver for MockWiki {
        fn target_of(&mut self, _title: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn options() -> RunOptions {
        RunOptions::from_config(&BotConfig::default())
    }

    #[test]
    fn update_edits_the_transformed_page() {
        let mut wiki = MockWiki::seeded();
        let report =
            run_update(&mut wiki, LIST_TITLE, &BotConfig::default(), &options()).expect("run");
        assert_eq!(report.action, RunAction::Updated);
        assert_eq!(wiki.edits.len(), 1);
        let (_, text, summary) = &wiki.edits[0];
        assert!(text.contains("== People (2 articles) =="));
        assert!(text.contains("{{Icon|ga}} [[Ada Lovelace]]"));
        assert_eq!(summary, crate::config::DEFAULT_SUMMARY);
    }

    #[test]
    fn dry_run_reports_a_diff_and_never_edits() {
        let mut wiki = MockWiki::seeded();
        let run_options = RunOptions {
            dry_run: true,
            ..options()
        };
        let report =
            run_update(&mut wiki, LIST_TITLE, &BotConfig::default(), &run_options).expect("run");
        assert_eq!(report.action, RunAction::DryRun);
        let diff = report.diff.expect("diff");
        assert!(diff.contains("-== People (9 articles) =="));
        assert!(diff.contains("+== People (2 articles) =="));
        assert!(wiki.edits.is_empty());
    }

    #[test]
    fn unchanged_pages_are_not_edited() {
        let mut wiki = MockWiki::seeded();
        let first =
            run_update(&mut wiki, LIST_TITLE, &BotConfig::default(), &options()).expect("run");
        assert_eq!(first.action, RunAction::Updated);
        let second =
            run_update(&mut wiki, LIST_TITLE, &BotConfig::default(), &options()).expect("run");
        assert_eq!(second.action, RunAction::SkippedUnchanged);
        assert_eq!(wiki.edits.len(), 1);
    }

    #[test]
    fn redirect_pages_are_skipped() {
        let mut wiki = MockWiki::seeded();
        wiki.redirect_pages.push(LIST_TITLE.to_string());
        let report =
            run_update(&mut wiki, LIST_TITLE, &BotConfig::default(), &options()).expect("run");
        assert_eq!(report.action, RunAction::SkippedRedirect);
        assert!(wiki.edits.is_empty());
    }

    #[test]
    fn missing_pages_are_an_error() {
        let mut wiki = MockWiki::default();
        let error = run_update(&mut wiki, "Nope", &BotConfig::default(), &options())
            .expect_err("must fail");
        assert!(error.to_string().contains("does not exist"));
    }

    #[test]
    fn shutoff_switch_blocks_edits() {
        let mut wiki = MockWiki::seeded();
        wiki.pages
            .insert("User:VitalBot/shutoff/4".to_string(), "paused".to_string());
        let config = BotConfig {
            task: crate::config::TaskSection {
                task_number: Some(4),
                ..crate::config::TaskSection::default()
            },
            ..BotConfig::default()
        };
        let report = run_update(&mut wiki, LIST_TITLE, &config, &options()).expect("run");
        assert_eq!(report.action, RunAction::SkippedShutoff);
        assert!(wiki.edits.is_empty());
    }

    #[test]
    fn shutoff_switch_allows_active_tasks() {
        let mut wiki = MockWiki::seeded();
        wiki.pages
            .insert("User:VitalBot/shutoff/4".to_string(), "active\n".to_string());
        let config = BotConfig {
            task: crate::config::TaskSection {
                task_number: Some(4),
                ..crate::config::TaskSection::default()
            },
            ..BotConfig::default()
        };
        assert!(task_switch_active(&mut wiki, &config).expect("check"));
        let report = run_update(&mut wiki, LIST_TITLE, &config, &options()).expect("run");
        assert_eq!(report.action, RunAction::Updated);
    }

    #[test]
    fn operator_tasks_bypass_the_switch() {
        let mut wiki = MockWiki::seeded();
        assert!(task_switch_active(&mut wiki, &BotConfig::default()).expect("check"));
    }

    #[test]
    fn missing_shutoff_page_counts_as_inactive() {
        let mut wiki = MockWiki::default();
        let config = BotConfig {
            task: crate::config::TaskSection {
                task_number: Some(9),
                ..crate::config::TaskSection::default()
            },
            ..BotConfig::default()
        };
        assert!(!task_switch_active(&mut wiki, &config).expect("check"));
    }
}
