//! Wiki markup parse/serialize tree for the bounded subset the bot edits:
//! headings, templates, links, list markers, comments and literal text.
//! Anything else rides through as opaque text so untouched regions
//! round-trip byte-identical.

use anyhow::Result;

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";
const MAX_HEADING_LEVEL: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Heading(Heading),
    Template(Template),
    Link(Link),
    Text(String),
    Newline,
}

/// A heading keeps its raw inner text (spaces included) so an untouched
/// heading serializes back exactly as it appeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    params: Vec<TemplateParam>,
}

/// One `|`-separated template segment, split into its raw key (text before
/// the first top-level `=`, if any) and raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParam {
    raw_key: Option<String>,
    raw_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub display: Option<String>,
}

impl TemplateParam {
    pub fn key(&self) -> Option<&str> {
        self.raw_key.as_deref().map(str::trim)
    }

    pub fn value(&self) -> &str {
        &self.raw_value
    }
}

impl Template {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_matches(&self, candidate: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(candidate)
    }

    pub fn name_lower(&self) -> String {
        self.name.trim().to_ascii_lowercase()
    }

    pub fn params(&self) -> &[TemplateParam] {
        &self.params
    }

    pub fn push_positional(&mut self, value: &str) {
        self.params.push(TemplateParam {
            raw_key: None,
            raw_value: value.to_string(),
        });
    }

    /// Look up a parameter by numeric-or-named key. Positional parameters
    /// count from `"1"`; an explicit `1=` key matches the same lookups.
    /// The last occurrence wins, as it does on a live wiki.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut positional = 0usize;
        let mut found = None;
        for param in &self.params {
            match param.key() {
                Some(name) => {
                    if name == key {
                        found = Some(param.raw_value.as_str());
                    }
                }
                None => {
                    positional += 1;
                    if positional.to_string() == key {
                        found = Some(param.raw_value.as_str());
                    }
                }
            }
        }
        found
    }

    /// Replace the value of the parameter `key` resolves to, appending a
    /// named parameter when no existing one matches.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut positional = 0usize;
        let mut target = None;
        for (index, param) in self.params.iter().enumerate() {
            match param.key() {
                Some(name) => {
                    if name == key {
                        target = Some(index);
                    }
                }
                None => {
                    positional += 1;
                    if positional.to_string() == key {
                        target = Some(index);
                    }
                }
            }
        }
        match target {
            Some(index) => self.params[index].raw_value = value.to_string(),
            None => self.params.push(TemplateParam {
                raw_key: Some(key.to_string()),
                raw_value: value.to_string(),
            }),
        }
    }

    fn serialize_into(&self, output: &mut String) {
        output.push_str("{{");
        output.push_str(&self.name);
        for param in &self.params {
            output.push('|');
            if let Some(key) = &param.raw_key {
                output.push_str(key);
                output.push('=');
            }
            output.push_str(&param.raw_value);
        }
        output.push_str("}}");
    }
}

impl Link {
    fn serialize_into(&self, output: &mut String) {
        output.push_str("[[");
        output.push_str(&self.target);
        if let Some(display) = &self.display {
            output.push('|');
            output.push_str(display);
        }
        output.push_str("]]");
    }
}

/// An index-based section view: the heading node plus the run of nodes up
/// to the next heading of level <= its own. Views alias the tree's node
/// sequence, so a heading rewrite is visible to later stages without a
/// re-parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub heading: usize,
    pub level: u8,
    pub end: usize,
}

impl Section {
    pub fn body_start(&self) -> usize {
        self.heading + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupTree {
    nodes: Vec<MarkupNode>,
}

impl MarkupTree {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut text_start = 0usize;
        let mut index = 0usize;
        let mut at_line_start = true;

        while index < raw.len() {
            let rest = &raw[index..];
            if rest.starts_with(COMMENT_OPEN) {
                flush_text(raw, text_start, index, &mut nodes);
                // Comments are opaque: delimiters inside them must not open
                // nodes. An unterminated comment runs to end of input.
                let end = rest
                    .find(COMMENT_CLOSE)
                    .map(|at| index + at + COMMENT_CLOSE.len())
                    .unwrap_or(raw.len());
                nodes.push(MarkupNode::Text(raw[index..end].to_string()));
                index = end;
                text_start = index;
                at_line_start = false;
                continue;
            }
            if rest.as_bytes()[0] == b'\n' {
                flush_text(raw, text_start, index, &mut nodes);
                nodes.push(MarkupNode::Newline);
                index += 1;
                text_start = index;
                at_line_start = true;
                continue;
            }
            if at_line_start && rest.as_bytes()[0] == b'=' {
                let line_end = rest.find('\n').map(|at| index + at).unwrap_or(raw.len());
                if let Some(heading) = parse_heading_line(&raw[index..line_end]) {
                    flush_text(raw, text_start, index, &mut nodes);
                    nodes.push(MarkupNode::Heading(heading));
                    index = line_end;
                    text_start = index;
                    at_line_start = false;
                    continue;
                }
            }
            if rest.starts_with("{{") {
                flush_text(raw, text_start, index, &mut nodes);
                let (template, consumed) = parse_template(rest)?;
                nodes.push(MarkupNode::Template(template));
                index += consumed;
                text_start = index;
                at_line_start = false;
                continue;
            }
            if rest.starts_with("[[") {
                flush_text(raw, text_start, index, &mut nodes);
                let (link, consumed) = parse_link(rest)?;
                nodes.push(MarkupNode::Link(link));
                index += consumed;
                text_start = index;
                at_line_start = false;
                continue;
            }
            at_line_start = false;
            index += char_width(rest);
        }
        flush_text(raw, text_start, raw.len(), &mut nodes);

        Ok(Self { nodes })
    }

    pub fn serialize(&self) -> String {
        let mut output = String::new();
        for node in &self.nodes {
            match node {
                MarkupNode::Heading(heading) => {
                    let marks = "=".repeat(usize::from(heading.level));
                    output.push_str(&marks);
                    output.push_str(&heading.text);
                    output.push_str(&marks);
                }
                MarkupNode::Template(template) => template.serialize_into(&mut output),
                MarkupNode::Link(link) => link.serialize_into(&mut output),
                MarkupNode::Text(text) => output.push_str(text),
                MarkupNode::Newline => output.push('\n'),
            }
        }
        output
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &MarkupNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut MarkupNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> &[MarkupNode] {
        &self.nodes
    }

    pub fn insert(&mut self, index: usize, node: MarkupNode) {
        self.nodes.insert(index, node);
    }

    pub fn remove(&mut self, index: usize) -> MarkupNode {
        self.nodes.remove(index)
    }

    /// Sections at the given heading depths, or every non-lead section when
    /// `levels` is `None`; document order either way.
    pub fn sections(&self, levels: Option<&[u8]>) -> Vec<Section> {
        let headings = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                MarkupNode::Heading(heading) => Some((index, heading.level)),
                _ => None,
            })
            .collect::<Vec<_>>();

        let mut sections = Vec::new();
        for (position, &(index, level)) in headings.iter().enumerate() {
            if let Some(wanted) = levels
                && !wanted.contains(&level)
            {
                continue;
            }
            let end = headings[position + 1..]
                .iter()
                .find(|&&(_, later_level)| later_level <= level)
                .map(|&(later_index, _)| later_index)
                .unwrap_or(self.nodes.len());
            sections.push(Section {
                heading: index,
                level,
                end,
            });
        }
        sections
    }

    pub fn template_indices<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&Template) -> bool,
    {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                MarkupNode::Template(template) if predicate(template) => Some(index),
                _ => None,
            })
            .collect()
    }

    /// All templates in document order, including ones nested inside other
    /// templates' parameter values (banner shells on talk pages). Returned
    /// by value: nested templates only exist as raw parameter text in the
    /// tree itself.
    pub fn templates_deep(&self) -> Vec<Template> {
        let mut output = Vec::new();
        for node in &self.nodes {
            if let MarkupNode::Template(template) = node {
                collect_templates(template, &mut output);
            }
        }
        output
    }
}

fn collect_templates(template: &Template, output: &mut Vec<Template>) {
    output.push(template.clone());
    for param in template.params() {
        if param.value().contains("{{")
            && let Ok(subtree) = MarkupTree::parse(param.value())
        {
            output.extend(subtree.templates_deep());
        }
    }
}

fn flush_text(raw: &str, start: usize, end: usize, nodes: &mut Vec<MarkupNode>) {
    if start < end {
        nodes.push(MarkupNode::Text(raw[start..end].to_string()));
    }
}

fn char_width(rest: &str) -> usize {
    rest.chars().next().map(char::len_utf8).unwrap_or(1)
}

/// A heading line is a balanced run of 1-6 `=` marks around non-empty inner
/// text, with nothing after the closing run. Anything else stays text.
fn parse_heading_line(line: &str) -> Option<Heading> {
    let leading = line.bytes().take_while(|&byte| byte == b'=').count();
    let trailing = line.bytes().rev().take_while(|&byte| byte == b'=').count();
    if leading == 0 || leading != trailing || leading > MAX_HEADING_LEVEL {
        return None;
    }
    if leading + trailing >= line.len() {
        return None;
    }
    Some(Heading {
        level: leading as u8,
        text: line[leading..line.len() - trailing].to_string(),
    })
}

fn parse_template(input: &str) -> Result<(Template, usize)> {
    let close = find_closing(input, "{{", "}}")
        .ok_or_else(|| anyhow::anyhow!("unterminated template: {}", snippet(input)))?;
    let inner = &input[2..close - 2];
    let segments = split_top_level(inner, b'|');
    let mut parts = segments.into_iter();
    let name = parts.next().unwrap_or_default();

    let mut template = Template::new(name);
    for segment in parts {
        match find_top_level(segment, b'=') {
            Some(at) => template.params.push(TemplateParam {
                raw_key: Some(segment[..at].to_string()),
                raw_value: segment[at + 1..].to_string(),
            }),
            None => template.params.push(TemplateParam {
                raw_key: None,
                raw_value: segment.to_string(),
            }),
        }
    }
    Ok((template, close))
}

fn parse_link(input: &str) -> Result<(Link, usize)> {
    let close = find_closing(input, "[[", "]]")
        .ok_or_else(|| anyhow::anyhow!("unterminated link: {}", snippet(input)))?;
    let inner = &input[2..close - 2];
    let link = match find_top_level(inner, b'|') {
        Some(at) => Link {
            target: inner[..at].to_string(),
            display: Some(inner[at + 1..].to_string()),
        },
        None => Link {
            target: inner.to_string(),
            display: None,
        },
    };
    Ok((link, close))
}

/// Byte offset just past the `close` that balances the `open` at offset 0,
/// skipping comment spans. `None` when the construct never closes.
fn find_closing(input: &str, open: &str, close: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = 0usize;
    while index < input.len() {
        let rest = &input[index..];
        if rest.starts_with(COMMENT_OPEN) {
            index = rest
                .find(COMMENT_CLOSE)
                .map(|at| index + at + COMMENT_CLOSE.len())
                .unwrap_or(input.len());
            continue;
        }
        if rest.starts_with(open) {
            depth += 1;
            index += open.len();
            continue;
        }
        if rest.starts_with(close) {
            depth = depth.saturating_sub(1);
            index += close.len();
            if depth == 0 {
                return Some(index);
            }
            continue;
        }
        index += char_width(rest);
    }
    None
}

/// Split on `separator` at depth 0 with respect to `{{}}`, `[[]]` and
/// comments, so pipes inside nested constructs stay put.
fn split_top_level(input: &str, separator: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    let mut template_depth = 0usize;
    let mut link_depth = 0usize;
    while index < input.len() {
        let rest = &input[index..];
        if rest.starts_with(COMMENT_OPEN) {
            index = rest
                .find(COMMENT_CLOSE)
                .map(|at| index + at + COMMENT_CLOSE.len())
                .unwrap_or(input.len());
            continue;
        }
        if rest.starts_with("{{") {
            template_depth += 1;
            index += 2;
            continue;
        }
        if rest.starts_with("}}") {
            template_depth = template_depth.saturating_sub(1);
            index += 2;
            continue;
        }
        if rest.starts_with("[[") {
            link_depth += 1;
            index += 2;
            continue;
        }
        if rest.starts_with("]]") {
            link_depth = link_depth.saturating_sub(1);
            index += 2;
            continue;
        }
        if rest.as_bytes()[0] == separator && template_depth == 0 && link_depth == 0 {
            parts.push(&input[start..index]);
            start = index + 1;
            index += 1;
            continue;
        }
        index += char_width(rest);
    }
    parts.push(&input[start..]);
    parts
}

fn find_top_level(input: &str, separator: u8) -> Option<usize> {
    let mut index = 0usize;
    let mut template_depth = 0usize;
    let mut link_depth = 0usize;
    while index < input.len() {
        let rest = &input[index..];
        if rest.starts_with(COMMENT_OPEN) {
            index = rest
                .find(COMMENT_CLOSE)
                .map(|at| index + at + COMMENT_CLOSE.len())
                .unwrap_or(input.len());
            continue;
        }
        if rest.starts_with("{{") {
            template_depth += 1;
            index += 2;
            continue;
        }
        if rest.starts_with("}}") {
            template_depth = template_depth.saturating_sub(1);
            index += 2;
            continue;
        }
        if rest.starts_with("[[") {
            link_depth += 1;
            index += 2;
            continue;
        }
        if rest.starts_with("]]") {
            link_depth = link_depth.saturating_sub(1);
            index += 2;
            continue;
        }
        if rest.as_bytes()[0] == separator && template_depth == 0 && link_depth == 0 {
            return Some(index);
        }
        index += char_width(rest);
    }
    None
}

fn snippet(input: &str) -> &str {
    let end = input
        .char_indices()
        .take(40)
        .last()
        .map(|(at, ch)| at + ch.len_utf8())
        .unwrap_or(input.len());
    &input[..end]
}
