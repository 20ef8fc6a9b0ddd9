//! The page-transform seam: one generic runner drives any `PageTransformer`;
//! the vital-list pipeline is one implementation, not a bot subclass.

use anyhow::Result;
use serde::Serialize;

use crate::assessment::{RedirectResolver, TalkPageProvider};
use crate::counts::{
    SectionCountReport, TotalReport, rewrite_section_counts, update_total_marker,
};
use crate::icons::{IconReport, reconcile_icons};
use crate::markup::MarkupTree;

/// A whole-page text transformation. Implementations must be idempotent:
/// transforming their own output again yields it unchanged.
pub trait PageTransformer {
    fn transform(&mut self, text: &str, context: &TransformContext<'_>) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub title: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    pub skip_assessment: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformOutcome {
    pub text: String,
    pub counts: SectionCountReport,
    pub total: TotalReport,
    pub icons: Option<IconReport>,
}

/// Fixed pipeline over one owned tree: parse, recount section headings,
/// aggregate the grand total from the rewritten headings, reconcile icon
/// markers, serialize.
pub struct VitalListTransformer<'a, S> {
    source: &'a mut S,
    options: TransformOptions,
}

impl<'a, S> VitalListTransformer<'a, S>
where
    S: TalkPageProvider + RedirectResolver,
{
    pub fn new(source: &'a mut S, options: TransformOptions) -> Self {
        Self { source, options }
    }

    pub fn apply(&mut self, text: &str) -> Result<TransformOutcome> {
        let mut tree = MarkupTree::parse(text)?;
        let counts = rewrite_section_counts(&mut tree);
        let total = update_total_marker(&mut tree);
        let icons = if self.options.skip_assessment {
            None
        } else {
            Some(reconcile_icons(&mut tree, self.source)?)
        };
        Ok(TransformOutcome {
            text: tree.serialize(),
            counts,
            total,
            icons,
        })
    }
}

impl<'a, S> PageTransformer for VitalListTransformer<'a, S>
where
    S: TalkPageProvider + RedirectResolver,
{
    fn transform(&mut self, text: &str, _context: &TransformContext<'_>) -> Result<String> {
        Ok(self.apply(text)?.text)
    }
}

/// The offline stages only: recount and total aggregation without any
/// talk-page traffic. What `vitalbot render` runs against a local file.
pub fn transform_offline(text: &str) -> Result<TransformOutcome> {
    let mut tree = MarkupTree::parse(text)?;
    let counts = rewrite_section_counts(&mut tree);
    let total = update_total_marker(&mut tree);
    Ok(TransformOutcome {
        text: tree.serialize(),
        counts,
        total,
        icons: None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;

    use super::{TransformContext, TransformOptions, VitalListTransformer, transform_offline};
    use crate::assessment::{RedirectResolver, TalkPageProvider};
    use crate::transform::PageTransformer;

    #[derive(Default)]
    struct MockTalkSource {
        pages: BTreeMap<String, String>,
        fetches: usize,
    }

    impl TalkPageProvider for MockTalkSource {
        fn get_text(&mut self, title: &str) -> Result<Option<String>> {
            self.fetches += 1;
            Ok(self.pages.get(title).cloned())
        }
    }

    impl RedirectResolver for MockTalkSource {
        fn target_of(&mut self, _title: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    const PAGE: &str = "{{huge|Total articles: 0}}\n\
== People (9 articles) ==\n\
# {{Icon|b}} [[Ada Lovelace]]\n\
# {{Icon|fa}} [[Alan Turing]]\n\
== Places (0 articles) ==\n\
# {{Icon|start}} [[Berlin]]\n";

    fn talk_source() -> MockTalkSource {
        let mut source = MockTalkSource::default();
        for (title, class) in [
            ("Ada Lovelace", "ga"),
            ("Alan Turing", "fa"),
            ("Berlin", "start"),
        ] {
            source.pages.insert(
                format!("Talk:{title}"),
                format!("{{{{WikiProject Test|class={class}}}}}"),
            );
        }
        source
    }

    #[test]
    fn full_pipeline_recounts_totals_and_reconciles() {
        let mut source = talk_source();
        let mut transformer =
            VitalListTransformer::new(&mut source, TransformOptions::default());
        let outcome = transformer.apply(PAGE).expect("transform");
        assert!(outcome.text.starts_with("{{huge|Total articles: 3}}"));
        assert!(outcome.text.contains("== People (2 articles) =="));
        assert!(outcome.text.contains("== Places (1 article) =="));
        assert!(outcome.text.contains("{{Icon|ga}} [[Ada Lovelace]]"));
        assert_eq!(outcome.icons.expect("icon report").lookups, 3);
    }

    #[test]
    fn pipeline_is_idempotent_end_to_end() {
        let mut source = talk_source();
        let first = {
            let mut transformer =
                VitalListTransformer::new(&mut source, TransformOptions::default());
            transformer.apply(PAGE).expect("transform").text
        };
        let mut source = talk_source();
        let mut transformer =
            VitalListTransformer::new(&mut source, TransformOptions::default());
        let second = transformer.apply(&first).expect("transform").text;
        assert_eq!(second, first);
    }

    #[test]
    fn skip_assessment_runs_no_lookups() {
        let mut source = talk_source();
        let mut transformer = VitalListTransformer::new(
            &mut source,
            TransformOptions {
                skip_assessment: true,
            },
        );
        let outcome = transformer.apply(PAGE).expect("transform");
        assert!(outcome.icons.is_none());
        assert!(outcome.text.contains("{{Icon|b}} [[Ada Lovelace]]"));
        assert_eq!(source.fetches, 0);
    }

    #[test]
    fn transformer_trait_returns_the_pipeline_text() {
        let mut source = talk_source();
        let mut transformer =
            VitalListTransformer::new(&mut source, TransformOptions::default());
        let context = TransformContext {
            title: "Wikipedia:Vital articles",
        };
        let text = transformer.transform(PAGE, &context).expect("transform");
        assert!(text.starts_with("{{huge|Total articles: 3}}"));
    }

    #[test]
    fn offline_transform_touches_no_icons() {
        let outcome = transform_offline(PAGE).expect("transform");
        assert!(outcome.text.contains("{{Icon|b}} [[Ada Lovelace]]"));
        assert!(outcome.text.starts_with("{{huge|Total articles: 3}}"));
    }
}
