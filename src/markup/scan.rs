//! Line-level helpers shared by every markup scanner.
//!
//! Indentation is measured in bytes of leading whitespace. Fenced code
//! blocks are delimited by lines whose first non-blank characters are
//! three backticks.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::DocError;

static AUTODOC_LINE: OnceLock<Regex> = OnceLock::new();
static METHOD_ITEM: OnceLock<Regex> = OnceLock::new();
static LIST_ITEM: OnceLock<Regex> = OnceLock::new();

fn autodoc_line_re() -> &'static Regex {
    AUTODOC_LINE.get_or_init(|| {
        Regex::new(r"^\s*\[\[autodoc\]\]\s+(\S+)\s*$").expect("autodoc regex should compile")
    })
}

fn method_item_re() -> &'static Regex {
    METHOD_ITEM.get_or_init(|| {
        Regex::new(r"^\s*-\s+(\S+)\s*$").expect("method item regex should compile")
    })
}

fn list_item_re() -> &'static Regex {
    LIST_ITEM.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+\.)\s").expect("list item regex should compile")
    })
}

/// Whether `line` holds nothing but whitespace.
pub fn is_empty_line(line: &str) -> bool {
    line.trim().is_empty()
}

/// Width of the leading whitespace in characters. A blank line measures its full length.
pub fn find_indent(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// `line` without up to `n` leading whitespace characters.
pub fn strip_indent(line: &str, n: usize) -> &str {
    let end = line
        .char_indices()
        .take(n)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(0, |(idx, c)| idx + c.len_utf8());
    &line[end..]
}

/// Whether `line` opens or closes a fenced code block.
pub fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Object path of an `[[autodoc]] path` line.
pub fn autodoc_target(line: &str) -> Option<&str> {
    autodoc_line_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Name in a `- name` method line.
pub fn method_item(line: &str) -> Option<&str> {
    method_item_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn is_list_item(line: &str) -> bool {
    list_item_re().is_match(line)
}

/// Tracks whether a line scanner sits inside a fenced code block.
#[derive(Debug, Default, Clone)]
pub struct FenceState {
    opened_at: Option<usize>,
}

impl FenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed line `idx` (0-based). Returns true when the line belongs to a
    /// fenced block, delimiters included.
    pub fn update(&mut self, idx: usize, line: &str) -> bool {
        if is_fence(line) {
            self.opened_at = match self.opened_at {
                Some(_) => None,
                None => Some(idx),
            };
            true
        } else {
            self.opened_at.is_some()
        }
    }

    pub fn in_code(&self) -> bool {
        self.opened_at.is_some()
    }

    /// Fails when a fence was opened and never closed.
    pub fn finish(&self) -> Result<(), DocError> {
        match self.opened_at {
            Some(idx) => Err(DocError::UnclosedFence { line: idx + 1 }),
            None => Ok(()),
        }
    }
}

/// Check that every code fence in `text` is closed.
pub fn check_fences(text: &str) -> Result<(), DocError> {
    let mut fence = FenceState::new();
    for (idx, line) in text.split('\n').enumerate() {
        fence.update(idx, line);
    }
    fence.finish()
}

/// Apply `f` to every run of lines outside fenced code blocks, leaving code untouched.
pub fn map_prose(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut fence = FenceState::new();

    for (idx, line) in text.split('\n').enumerate() {
        if fence.update(idx, line) {
            if !prose.is_empty() {
                parts.push(f(&prose.join("\n")));
                prose.clear();
            }
            parts.push(line.to_string());
        } else {
            prose.push(line);
        }
    }
    if !prose.is_empty() {
        parts.push(f(&prose.join("\n")));
    }

    parts.join("\n")
}

/// Strip the common indentation of the non-blank lines. Blank lines become empty.
pub fn dedent_lines(lines: &[&str]) -> Vec<String> {
    let min_indent = lines
        .iter()
        .filter(|line| !is_empty_line(line))
        .map(|line| find_indent(line))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if is_empty_line(line) {
                String::new()
            } else {
                strip_indent(line, min_indent).to_string()
            }
        })
        .collect()
}

/// Remove indentation from a whole document, keeping only what list nesting needs.
///
/// Prose lines lose their indent. List items are renormalized so each nesting
/// level sits two columns deeper than its parent, and continuation lines follow
/// the item they belong to. Code fences move with their opening line and keep
/// the relative indentation of their body. The `- method` list under an
/// `[[autodoc]]` line keeps its indentation relative to the directive.
/// Blank lines are left as they are.
pub fn remove_indent(text: &str) -> String {
    let mut out = Vec::new();
    // (source indent, normalized indent) of each open list level
    let mut levels: Vec<(usize, usize)> = Vec::new();
    // (source indent, normalized indent) of the open code fence
    let mut fence: Option<(usize, usize)> = None;
    let mut autodoc_indent: Option<usize> = None;

    for line in text.split('\n') {
        if let Some((source, target)) = fence {
            out.push(reindent(line, source, target));
            if is_fence(line) {
                fence = None;
            }
            continue;
        }
        if is_empty_line(line) {
            out.push(line.to_string());
            continue;
        }

        let indent = find_indent(line);
        if autodoc_target(line).is_some() {
            levels.clear();
            autodoc_indent = Some(indent);
            out.push(strip_indent(line, indent).to_string());
            continue;
        }
        if let Some(base) = autodoc_indent {
            if indent > base && method_item(line).is_some() {
                out.push(strip_indent(line, base).to_string());
                continue;
            }
            autodoc_indent = None;
        }

        while levels.last().is_some_and(|&(source, _)| source > indent) {
            levels.pop();
        }
        let target = if is_list_item(line) {
            match levels.last() {
                Some(&(source, normalized)) if source == indent => normalized,
                Some(&(_, normalized)) => {
                    levels.push((indent, normalized + 2));
                    normalized + 2
                }
                None => {
                    levels.push((indent, 0));
                    0
                }
            }
        } else {
            match levels.last() {
                Some(&(source, normalized)) if source == indent => normalized,
                Some(&(_, normalized)) => normalized + 2,
                None => 0,
            }
        };

        if is_fence(line) {
            fence = Some((indent, target));
        }
        out.push(format!("{}{}", " ".repeat(target), strip_indent(line, indent)));
    }

    out.join("\n")
}

fn reindent(line: &str, source: usize, target: usize) -> String {
    if is_empty_line(line) {
        return String::new();
    }
    format!("{}{}", " ".repeat(target), strip_indent(line, source))
}
