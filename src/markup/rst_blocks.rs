//! Block-level RST: directives, comments, literal blocks, titles and table borders.
//!
//! The converter is a line scanner. Each construct is recognized on its
//! introducing line, then its body is every following line that is blank or
//! indented deeper than that line (trailing blank lines excluded). Bodies lose
//! exactly one indentation level before being rewritten, and the output is
//! re-indented at the introducing line's indent so nested docstring content
//! stays where it was.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::scan::{dedent_lines, find_indent, is_empty_line, is_fence};
use crate::types::PageInfo;

static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
static ANCHOR: OnceLock<Regex> = OnceLock::new();
static LITERAL_INTRO: OnceLock<Regex> = OnceLock::new();
static TABLE_BORDER: OnceLock<Regex> = OnceLock::new();
static OPTION: OnceLock<Regex> = OnceLock::new();

fn directive_re() -> &'static Regex {
    DIRECTIVE.get_or_init(|| {
        Regex::new(r"^\s*\.\.\s+([A-Za-z][\w:-]*?)::(?:\s+(.*?))?\s*$")
            .expect("directive regex should compile")
    })
}

fn anchor_re() -> &'static Regex {
    ANCHOR.get_or_init(|| {
        Regex::new(r"^\s*\.\.\s+_([^:]+):\s*$").expect("anchor regex should compile")
    })
}

fn literal_intro_re() -> &'static Regex {
    LITERAL_INTRO.get_or_init(|| {
        Regex::new(r"^\s*(\S.*?)::\s*$").expect("literal block regex should compile")
    })
}

fn table_border_re() -> &'static Regex {
    TABLE_BORDER.get_or_init(|| {
        Regex::new(r"^\s*(?:\|\s*)?\+[-=+ ]*[-=][-=+ ]*\+\s*$").expect("table regex should compile")
    })
}

fn option_re() -> &'static Regex {
    OPTION.get_or_init(|| {
        Regex::new(r"^\s*:([\w-]+):(?:\s+(.*?))?\s*$").expect("option regex should compile")
    })
}

const AUTODOC_DIRECTIVES: &[&str] = &[
    "autoclass",
    "autofunction",
    "automethod",
    "autodata",
    "autoexception",
];

const TIP_DIRECTIVES: &[&str] = &["note", "tip", "hint", "important", "seealso"];

const WARNING_DIRECTIVES: &[&str] = &["warning", "caution", "danger", "attention", "error"];

const DROPPED_DIRECTIVES: &[&str] = &["currentmodule", "module", "py:currentmodule"];

/// What an introducing line starts.
#[derive(Debug, PartialEq, Eq)]
enum BlockStart<'a> {
    TableBorder,
    Anchor(&'a str),
    Directive {
        name: &'a str,
        argument: &'a str,
    },
    Comment(&'a str),
    LiteralBlock(&'a str),
    Text,
}

fn classify(line: &str) -> BlockStart<'_> {
    if table_border_re().is_match(line) {
        return BlockStart::TableBorder;
    }
    if let Some(caps) = anchor_re().captures(line) {
        if let Some(name) = caps.get(1) {
            return BlockStart::Anchor(name.as_str().trim());
        }
    }
    if let Some(caps) = directive_re().captures(line) {
        if let Some(name) = caps.get(1) {
            let argument = caps.get(2).map_or("", |m| m.as_str());
            return BlockStart::Directive {
                name: name.as_str(),
                argument,
            };
        }
    }
    let trimmed = line.trim();
    if trimmed == ".." {
        return BlockStart::Comment("");
    }
    if let Some(rest) = trimmed.strip_prefix(".. ") {
        return BlockStart::Comment(rest.trim());
    }
    if trimmed == "::" {
        return BlockStart::LiteralBlock("");
    }
    if let Some(caps) = literal_intro_re().captures(line) {
        if let Some(title) = caps.get(1) {
            return BlockStart::LiteralBlock(title.as_str());
        }
    }
    BlockStart::Text
}

/// End (exclusive) of the body starting at `start` for a construct at `indent`.
fn block_end(lines: &[&str], start: usize, indent: usize) -> usize {
    let mut end = start;
    let mut idx = start;
    while idx < lines.len() && (is_empty_line(lines[idx]) || find_indent(lines[idx]) > indent) {
        idx += 1;
        if !is_empty_line(lines[idx - 1]) {
            end = idx;
        }
    }
    end
}

/// Leading `:name: value` options with continuation lines joined, and the
/// index of the first line after them.
fn split_options(lines: &[&str]) -> (BTreeMap<String, String>, usize) {
    let mut options = BTreeMap::new();
    let mut idx = 0;

    while idx < lines.len() {
        let Some(caps) = option_re().captures(lines[idx]) else {
            break;
        };
        let option_indent = find_indent(lines[idx]);
        let name = caps[1].to_string();
        let mut value = caps.get(2).map_or("", |m| m.as_str()).to_string();
        idx += 1;

        while idx < lines.len()
            && !is_empty_line(lines[idx])
            && find_indent(lines[idx]) > option_indent
            && !option_re().is_match(lines[idx])
        {
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(lines[idx].trim());
            idx += 1;
        }
        options.insert(name, value);
    }

    (options, idx)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn indent_lines(lines: Vec<String>, indent: usize) -> Vec<String> {
    let pad = " ".repeat(indent);
    lines
        .into_iter()
        .map(|line| {
            if line.is_empty() {
                line
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect()
}

/// Body lines after the options, with leading blanks skipped and one indent level removed.
fn content_lines(body: &[&str]) -> Vec<String> {
    let first = body
        .iter()
        .position(|line| !is_empty_line(line))
        .unwrap_or(body.len());
    dedent_lines(&body[first..])
}

/// Rewrite RST blocks into MDX blocks.
pub fn convert_rst_blocks(text: &str, page_info: &PageInfo) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if in_fence || is_fence(line) {
            out.push(line.to_string());
            idx += 1;
            continue;
        }

        let indent = find_indent(line);
        match classify(line) {
            BlockStart::TableBorder => {
                idx += 1;
            }
            BlockStart::Anchor(name) => {
                out.push(format!("{}<a id=\"{}\"></a>", " ".repeat(indent), name));
                idx += 1;
            }
            BlockStart::Comment(first) => {
                let end = block_end(&lines, idx + 1, indent);
                let mut content: Vec<String> = Vec::new();
                if !first.is_empty() {
                    content.push(first.to_string());
                }
                content.extend(content_lines(&lines[idx + 1..end]));
                let comment = vec![format!("<!--{}", content.join("\n")), "-->".to_string()];
                out.extend(indent_lines(comment, indent));
                idx = end;
            }
            BlockStart::Directive { name, argument } => {
                let end = block_end(&lines, idx + 1, indent);
                let converted = convert_directive(name, argument, line, &lines[idx + 1..end], page_info);
                out.extend(indent_lines(converted, indent));
                idx = end;
            }
            BlockStart::LiteralBlock(title) => {
                let end = block_end(&lines, idx + 1, indent);
                if end == idx + 1 {
                    // no indented block follows: plain paragraph ending in "::"
                    let trimmed = line.trim_end();
                    out.push(trimmed[..trimmed.len() - 1].to_string());
                    idx += 1;
                    continue;
                }
                let mut block = Vec::new();
                if !title.is_empty() {
                    block.push(format!("> {}:", title));
                    block.push(String::new());
                }
                block.push("```".to_string());
                block.extend(content_lines(&lines[idx + 1..end]));
                block.push("```".to_string());
                out.extend(indent_lines(block, indent));
                idx = end;
            }
            BlockStart::Text => {
                out.push(line.to_string());
                idx += 1;
            }
        }
    }

    out.join("\n")
}

fn convert_directive(
    name: &str,
    argument: &str,
    line: &str,
    body: &[&str],
    page_info: &PageInfo,
) -> Vec<String> {
    let (options, content_start) = split_options(body);
    let content = content_lines(&body[content_start..]);

    match name {
        "code-block" | "code" | "sourcecode" => {
            let mut block = vec![format!("```{}", argument)];
            block.extend(content);
            block.push("```".to_string());
            block
        }
        "math" => {
            let formula = if argument.is_empty() {
                content.join("\n")
            } else {
                argument.to_string()
            };
            vec![format!("$${}$$", formula.trim())]
        }
        "image" | "figure" => {
            let img = match options.get("alt") {
                Some(alt) => format!("<img alt=\"{}\" src=\"{}\"/>", alt, argument),
                None => format!("<img src=\"{}\"/>", argument),
            };
            match options.get("target") {
                Some(target) => vec![format!("<a href=\"{}\">{}</a>", target, img)],
                None => vec![img],
            }
        }
        _ if AUTODOC_DIRECTIVES.contains(&name) => {
            let mut block = vec![format!("[[autodoc]] {}", argument)];
            if let Some(special) = options.get("special-members") {
                block.extend(split_list(special).map(|m| format!("    - {}", m)));
            }
            if let Some(members) = options.get("members") {
                let listed: Vec<&str> = split_list(members).collect();
                if listed.is_empty() {
                    block.push("    - all".to_string());
                } else {
                    block.extend(listed.into_iter().map(|m| format!("    - {}", m)));
                }
            }
            block
        }
        _ if TIP_DIRECTIVES.contains(&name) || WARNING_DIRECTIVES.contains(&name) => {
            let opening = if WARNING_DIRECTIVES.contains(&name) {
                "<Tip warning={true}>"
            } else {
                "<Tip>"
            };
            let mut inner: Vec<String> = Vec::new();
            if !argument.is_empty() {
                inner.push(argument.to_string());
            }
            inner.extend(content);
            let nested = convert_rst_blocks(&inner.join("\n"), page_info);

            let mut block = vec![opening.to_string(), String::new()];
            block.extend(nested.split('\n').map(str::to_string));
            block.push(String::new());
            block.push("</Tip>".to_string());
            block
        }
        _ if DROPPED_DIRECTIVES.contains(&name) => Vec::new(),
        _ => {
            let mut comment = vec![line.trim().to_string()];
            comment.extend(dedent_lines(body));
            while comment.last().is_some_and(|l| l.is_empty()) {
                comment.pop();
            }
            vec![format!("<!--{}", comment.join("\n")), "-->".to_string()]
        }
    }
}

/// Turn underlined (and overlined) section titles into `#` headings.
///
/// Levels follow the order in which underline styles first appear.
pub fn process_titles(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut styles: Vec<(char, bool)> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    let mut idx = 0;

    let heading = |style: (char, bool), title: &str, styles: &mut Vec<(char, bool)>| {
        let level = match styles.iter().position(|s| *s == style) {
            Some(pos) => pos + 1,
            None => {
                styles.push(style);
                styles.len()
            }
        };
        format!("{} {}", "#".repeat(level.min(6)), title.trim())
    };

    while idx < lines.len() {
        if idx + 2 < lines.len() {
            if let (Some(over), Some(under)) =
                (underline_char(lines[idx]), underline_char(lines[idx + 2]))
            {
                if over == under && is_title_text(lines[idx + 1]) {
                    out.push(heading((over, true), lines[idx + 1], &mut styles));
                    idx += 3;
                    continue;
                }
            }
        }
        if idx + 1 < lines.len() && is_title_text(lines[idx]) {
            if let Some(under) = underline_char(lines[idx + 1]) {
                if lines[idx + 1].trim_end().chars().count() >= lines[idx].trim().chars().count() {
                    out.push(heading((under, false), lines[idx], &mut styles));
                    idx += 2;
                    continue;
                }
            }
        }
        out.push(lines[idx].to_string());
        idx += 1;
    }

    out.join("\n")
}

fn underline_char(line: &str) -> Option<char> {
    let line = line.trim_end();
    if line.len() < 3 || find_indent(line) > 0 {
        return None;
    }
    let first = line.chars().next()?;
    if !"=-~^\"'#*+:._".contains(first) {
        return None;
    }
    line.chars().all(|c| c == first).then_some(first)
}

fn is_title_text(line: &str) -> bool {
    !is_empty_line(line)
        && find_indent(line) == 0
        && !line.starts_with("..")
        && underline_char(line).is_none()
}
