//! Markup conversion: RST and Markdown sources to MDX.

pub mod docstring;
pub mod html_strip;
pub mod markdown;
pub mod rst_blocks;
pub mod rst_inline;
pub mod scan;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{DocError, PageInfo};

pub use docstring::{parse_docstring, DocstringSections};
pub use markdown::{clean_doctest_syntax, convert_special_chars, process_md};
pub use rst_blocks::{convert_rst_blocks, process_titles};
pub use rst_inline::convert_inline;
pub use scan::{check_fences, remove_indent};

static RST_MARKERS: OnceLock<Regex> = OnceLock::new();

fn rst_markers_re() -> &'static Regex {
    RST_MARKERS.get_or_init(|| {
        Regex::new(r"(?m):(?:obj|func|class|meth):`[^`]+`|(?:^|[^`])``[^`]+``(?:[^`]|$)")
            .expect("dialect regex should compile")
    })
}

/// Markup flavour a docstring is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rst,
    Markdown,
}

impl Dialect {
    /// RST when the prose uses a cross-reference role or a double-backquote span.
    /// Fenced code blocks are not looked at.
    pub fn detect(text: &str) -> Self {
        let mut fence = scan::FenceState::new();
        let prose = text
            .split('\n')
            .enumerate()
            .filter(|&(idx, line)| !fence.update(idx, line))
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n");
        if rst_markers_re().is_match(&prose) {
            Dialect::Rst
        } else {
            Dialect::Markdown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Rst => "rst",
            Dialect::Markdown => "markdown",
        }
    }

    pub fn converter(&self) -> &'static dyn Converter {
        match self {
            Dialect::Rst => &RstConverter,
            Dialect::Markdown => &MarkdownConverter,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rst" => Ok(Dialect::Rst),
            "md" | "markdown" => Ok(Dialect::Markdown),
            _ => Err(format!("Unknown markup dialect: {}", s)),
        }
    }
}

/// Turns one docstring fragment into MDX.
pub trait Converter: Send + Sync {
    fn convert(&self, text: &str, page_info: &PageInfo) -> Result<String, DocError>;
}

pub struct RstConverter;

impl Converter for RstConverter {
    fn convert(&self, text: &str, page_info: &PageInfo) -> Result<String, DocError> {
        let text = convert_rst_blocks(text, page_info);
        let text = remove_indent(&text);
        let text = convert_inline(&text, page_info);
        let text = convert_special_chars(&text);
        let text = clean_doctest_syntax(&text);
        Ok(markdown::convert_img_links(&text, page_info))
    }
}

pub struct MarkdownConverter;

impl Converter for MarkdownConverter {
    fn convert(&self, text: &str, page_info: &PageInfo) -> Result<String, DocError> {
        process_md(&remove_indent(text), page_info)
    }
}

/// Convert a whole RST page to MDX.
pub fn convert_rst_to_mdx(text: &str, page_info: &PageInfo) -> Result<String, DocError> {
    let text = text.trim_start_matches('\u{feff}');
    let text = process_titles(text);
    let text = convert_rst_blocks(&text, page_info);
    let text = convert_inline(&text, page_info);
    let text = convert_special_chars(&text);
    let text = clean_doctest_syntax(&text);
    let text = markdown::convert_img_links(&text, page_info);
    check_fences(&text)?;
    Ok(text)
}

/// Convert a whole Markdown page to MDX.
pub fn convert_md_to_mdx(text: &str, page_info: &PageInfo) -> Result<String, DocError> {
    let text = text.trim_start_matches('\u{feff}');
    check_fences(text)?;
    process_md(text, page_info)
}
