//! Structural segmentation: split a source file into declaration regions and
//! the gap regions between them.

use super::{DeclarationKind, Grammar};
use tree_sitter::Node;

/// A line-aligned slice of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// First line (0-indexed)
    pub start_line: usize,
    /// Last line, inclusive
    pub end_line: usize,
    /// Declared name for declaration regions; `None` for gaps
    pub symbol: Option<String>,
    /// The region's lines joined with `\n`
    pub text: String,
    is_gap: bool,
}

/// Lines of `source`, without the empty line after a trailing newline.
pub fn source_lines(source: &str) -> Vec<&str> {
    if source.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = source.split('\n').collect();
    if source.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Segment `source` into regions that partition its lines.
///
/// Wanted nodes are snapped to whole lines: a declaration that starts
/// mid-line owns that line, and a declaration whose lines were already
/// claimed by its predecessor only keeps the remainder. Whitespace-only gaps
/// are folded into the following region (the preceding one at end of file),
/// so every line of a non-blank file lands in exactly one region.
pub fn segment(source: &str, grammar: &Grammar) -> Result<Vec<Region>, String> {
    let lines = source_lines(source);
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let last_line = lines.len() - 1;

    let mut parser = grammar.parser()?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "Failed to parse content".to_string())?;

    let declarations = collect_declarations(tree.root_node(), grammar);

    let mut regions = Vec::new();
    let mut next_line = 0;

    for (node, decl) in declarations {
        let (start, end) = line_span(node, last_line);
        if end < next_line {
            continue;
        }
        let start = start.max(next_line);

        if start > next_line {
            regions.push(region(&lines, next_line, start - 1, None, true));
        }

        let symbol = decl.name(node, source).map(str::to_string);
        regions.push(region(&lines, start, end, symbol, false));
        next_line = end + 1;
    }

    if next_line <= last_line {
        regions.push(region(&lines, next_line, last_line, None, true));
    }

    Ok(fold_blank_gaps(regions, &lines))
}

/// Collect wanted nodes in source order without descending into them.
///
/// Uses an explicit stack so deeply nested trees cannot exhaust the call
/// stack.
fn collect_declarations<'t>(root: Node<'t>, grammar: &Grammar) -> Vec<(Node<'t>, DeclarationKind)> {
    let mut found = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(decl) = grammar.declaration(node.kind()) {
            found.push((node, decl));
            continue;
        }
        for i in (0..node.child_count()).rev() {
            stack.extend(node.child(i));
        }
    }

    found.sort_by_key(|(node, _)| node.start_byte());
    found
}

/// Inclusive line span of a node. A node ending at column 0 ends on the
/// previous line.
fn line_span(node: Node<'_>, last_line: usize) -> (usize, usize) {
    let start = node.start_position().row;
    let end_pos = node.end_position();
    let mut end = end_pos.row;
    if end_pos.column == 0 && end > start {
        end -= 1;
    }
    (start.min(last_line), end.min(last_line))
}

fn region(lines: &[&str], start: usize, end: usize, symbol: Option<String>, is_gap: bool) -> Region {
    Region {
        start_line: start,
        end_line: end,
        symbol,
        text: lines[start..=end].join("\n"),
        is_gap,
    }
}

fn fold_blank_gaps(regions: Vec<Region>, lines: &[&str]) -> Vec<Region> {
    let mut folded: Vec<Region> = Vec::with_capacity(regions.len());
    let mut pending_start: Option<usize> = None;

    for mut current in regions {
        if current.is_gap && current.text.trim().is_empty() {
            pending_start.get_or_insert(current.start_line);
            continue;
        }
        if let Some(start) = pending_start.take() {
            current = region(lines, start, current.end_line, current.symbol, current.is_gap);
        }
        folded.push(current);
    }

    if let Some(start) = pending_start {
        if let Some(prev) = folded.pop() {
            let end = lines.len() - 1;
            debug_assert!(start == prev.end_line + 1);
            folded.push(region(lines, prev.start_line, end, prev.symbol, prev.is_gap));
        }
    }

    folded
}
