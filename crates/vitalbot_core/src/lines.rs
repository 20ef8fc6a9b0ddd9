//! Line segmentation over a markup tree: maximal runs of nodes with no
//! newline inside, exposed as index ranges so mutation goes through the
//! owning tree.

use crate::markup::{MarkupNode, MarkupTree};

/// Node index range `[start, end)`; the node at `end` is the terminating
/// newline (or one past the last node). A view, not a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub start: usize,
    pub end: usize,
}

/// The first non-empty line at or after node index `from`. Cursor-style so
/// a pass that inserts or removes nodes can continue with adjusted indices.
pub fn next_line(tree: &MarkupTree, from: usize) -> Option<Line> {
    let mut start = from;
    while start < tree.len() && matches!(tree.node(start), MarkupNode::Newline) {
        start += 1;
    }
    if start >= tree.len() {
        return None;
    }
    let mut end = start;
    while end < tree.len() && !matches!(tree.node(end), MarkupNode::Newline) {
        end += 1;
    }
    Some(Line { start, end })
}

/// Lazy, restartable segmentation of the whole tree.
pub fn lines(tree: &MarkupTree) -> impl Iterator<Item = Line> + '_ {
    let mut cursor = 0usize;
    std::iter::from_fn(move || {
        let line = next_line(tree, cursor)?;
        cursor = line.end + 1;
        Some(line)
    })
}

/// Lines whose nodes fall entirely inside `[start, end)`. Section
/// boundaries sit on whole lines (headings own their line), so clamping is
/// a filter, not a split.
pub fn lines_within(tree: &MarkupTree, start: usize, end: usize) -> Vec<Line> {
    let mut output = Vec::new();
    let mut cursor = start;
    while let Some(line) = next_line(tree, cursor) {
        if line.start >= end {
            break;
        }
        if line.end <= end {
            output.push(line);
        }
        cursor = line.end + 1;
    }
    output
}

/// A list item starts its line with a `#` or `*` marker.
pub fn line_is_list_item(tree: &MarkupTree, line: Line) -> bool {
    matches!(
        tree.node(line.start),
        MarkupNode::Text(text) if text.starts_with('#') || text.starts_with('*')
    )
}
