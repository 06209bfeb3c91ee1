//! Markdown to MDX: escaping, image links, doctest flags and literal includes.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use super::scan::{dedent_lines, map_prose, strip_indent};
use crate::types::{DocError, PageInfo};

static IMG_LINK: OnceLock<Regex> = OnceLock::new();
static DOCTEST_FLAG: OnceLock<Regex> = OnceLock::new();
static FRAMEWORK_SPLIT: OnceLock<Regex> = OnceLock::new();
static LITERAL_INCLUDE: OnceLock<Regex> = OnceLock::new();

fn img_link_re() -> &'static Regex {
    IMG_LINK.get_or_init(|| Regex::new(r#"(src="|\()/imgs/"#).expect("img link regex should compile"))
}

fn doctest_flag_re() -> &'static Regex {
    DOCTEST_FLAG.get_or_init(|| {
        Regex::new(r"(?m)^(\s*>>>.*?\S)\s*#\s*doctest:\s*\+[A-Z_]+(?:\s*,\s*\+[A-Z_]+)*[ \t]*$")
            .expect("doctest regex should compile")
    })
}

fn framework_split_re() -> &'static Regex {
    FRAMEWORK_SPLIT.get_or_init(|| {
        Regex::new(r"(?m)^(\s*)>>>\s*#\s*===PT-TF-SPLIT===[ \t]*$").expect("split regex should compile")
    })
}

fn literal_include_re() -> &'static Regex {
    LITERAL_INCLUDE.get_or_init(|| {
        Regex::new(r"(?s)<literalinclude>(.*?)</literalinclude>").expect("literalinclude regex should compile")
    })
}

/// Tags MDX must see as components even though HTML does not know them.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Escape the characters MDX would otherwise parse as JSX or expressions.
///
/// `{` becomes `&amp;lcub;` unless it opens a svelte control block or sits
/// inside a tag. `<` becomes `&amp;lt;` unless it starts a comment, a closing
/// tag, a void element, a self-closing tag or a tag that is closed later on.
pub fn convert_special_chars(text: &str) -> String {
    map_prose(text, |prose| escape_prose(prose, text))
}

fn escape_prose(prose: &str, document: &str) -> String {
    let mut out = String::with_capacity(prose.len());
    let mut rest = prose;

    while let Some(pos) = rest.find(['<', '{']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with('{') {
            if is_svelte_block(tail) {
                out.push('{');
            } else {
                out.push_str("&amp;lcub;");
            }
            rest = &tail[1..];
        } else {
            match tag_len(tail, document) {
                Some(len) => {
                    out.push_str(&tail[..len]);
                    rest = &tail[len..];
                }
                None => {
                    out.push_str("&amp;lt;");
                    rest = &tail[1..];
                }
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_svelte_block(tail: &str) -> bool {
    ["{#", "{:", "{/", "{@"]
        .iter()
        .any(|prefix| tail.starts_with(prefix))
}

/// Length of the tag starting at `tail`, when `<` really opens markup.
fn tag_len(tail: &str, document: &str) -> Option<usize> {
    if tail.starts_with("<!--") {
        return tail.find("-->").map(|end| end + 3);
    }

    let (closing, name_start) = if tail.starts_with("</") {
        (true, 2)
    } else {
        (false, 1)
    };
    let name: String = tail[name_start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let end = tail.find('>')? + 1;
    let tag = &tail[..end];
    if closing
        || tag.ends_with("/>")
        || VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
        || document.contains(&format!("</{}", name))
    {
        Some(end)
    } else {
        None
    }
}

/// Point `/imgs/` references at the versioned docs tree.
pub fn convert_img_links(text: &str, page_info: &PageInfo) -> String {
    let base = format!("{}/imgs/", page_info.docs_base());
    img_link_re()
        .replace_all(text, |caps: &Captures| format!("{}{}", &caps[1], base))
        .into_owned()
}

/// Drop `# doctest: +FLAG` markers from `>>>` lines.
pub fn clean_doctest_syntax(text: &str) -> String {
    let text = framework_split_re().replace_all(text, "${1}===PT-TF-SPLIT===");
    doctest_flag_re().replace_all(&text, "$1").into_owned()
}

#[derive(Debug, Deserialize)]
struct LiteralInclude {
    path: String,
    #[serde(default)]
    language: String,
    #[serde(rename = "start-after")]
    start_after: Option<String>,
    #[serde(rename = "end-before")]
    end_before: Option<String>,
    #[serde(default)]
    dedent: Option<usize>,
}

/// Replace `<literalinclude>{json}</literalinclude>` blocks with the referenced code.
pub fn resolve_literal_includes(text: &str, page_info: &PageInfo) -> Result<String, DocError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in literal_include_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&render_literal_include(&caps[1], page_info)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn render_literal_include(args: &str, page_info: &PageInfo) -> Result<String, DocError> {
    let include: LiteralInclude = serde_json::from_str(args.trim())?;
    let base = page_info
        .path
        .as_deref()
        .and_then(Path::parent)
        .ok_or_else(|| DocError::LiteralInclude("the page has no source path".to_string()))?;
    let file = base.join(&include.path);
    let content = std::fs::read_to_string(&file).map_err(|e| {
        DocError::LiteralInclude(format!("cannot read {}: {}", file.display(), e))
    })?;

    let lines: Vec<&str> = content.lines().collect();
    let start = match &include.start_after {
        Some(marker) => {
            lines
                .iter()
                .position(|line| line.contains(marker.as_str()))
                .ok_or_else(|| {
                    DocError::LiteralInclude(format!("marker `{}` not found in {}", marker, include.path))
                })?
                + 1
        }
        None => 0,
    };
    let end = match &include.end_before {
        Some(marker) => {
            start
                + lines[start..]
                    .iter()
                    .position(|line| line.contains(marker.as_str()))
                    .ok_or_else(|| {
                        DocError::LiteralInclude(format!(
                            "marker `{}` not found in {}",
                            marker, include.path
                        ))
                    })?
        }
        None => lines.len(),
    };

    let body: Vec<String> = match include.dedent {
        Some(width) => lines[start..end]
            .iter()
            .map(|line| strip_indent(line, width).to_string())
            .collect(),
        None => dedent_lines(&lines[start..end]),
    };

    Ok(format!("```{}\n{}\n```", include.language, body.join("\n")))
}

/// Markdown page or docstring to MDX.
pub fn process_md(text: &str, page_info: &PageInfo) -> Result<String, DocError> {
    let text = resolve_literal_includes(text, page_info)?;
    let text = convert_special_chars(&text);
    let text = clean_doctest_syntax(&text);
    Ok(convert_img_links(&text, page_info))
}
