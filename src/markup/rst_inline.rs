//! Inline RST markup: roles, code spans and links.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::scan::map_prose;
use crate::types::PageInfo;

static OBJ_ROLE: OnceLock<Regex> = OnceLock::new();
static XREF_ROLE: OnceLock<Regex> = OnceLock::new();
static MATH_ROLE: OnceLock<Regex> = OnceLock::new();
static DOUBLE_BACKQUOTES: OnceLock<Regex> = OnceLock::new();
static EXTERNAL_LINK: OnceLock<Regex> = OnceLock::new();
static PREFIX_LINK: OnceLock<Regex> = OnceLock::new();
static DOC_ROLE: OnceLock<Regex> = OnceLock::new();
static REF_ROLE: OnceLock<Regex> = OnceLock::new();

fn obj_role_re() -> &'static Regex {
    OBJ_ROLE.get_or_init(|| {
        Regex::new(r":(?:obj|attr|data|exc|mod|const):`([^`]+)`").expect("obj role regex should compile")
    })
}

fn xref_role_re() -> &'static Regex {
    XREF_ROLE.get_or_init(|| {
        Regex::new(r":(?:class|func|meth):`([^`]+)`").expect("xref role regex should compile")
    })
}

fn math_role_re() -> &'static Regex {
    MATH_ROLE.get_or_init(|| {
        Regex::new(r":math:`([^`]+)`").expect("math role regex should compile")
    })
}

fn double_backquotes_re() -> &'static Regex {
    DOUBLE_BACKQUOTES.get_or_init(|| {
        Regex::new(r"(^|[^`])``([^`]+)``([^`]|$)").expect("double backquote regex should compile")
    })
}

fn external_link_re() -> &'static Regex {
    EXTERNAL_LINK.get_or_init(|| {
        Regex::new(r"`([^`<]+?)\s*<([^>`]+)>`__?").expect("link regex should compile")
    })
}

fn prefix_link_re() -> &'static Regex {
    PREFIX_LINK.get_or_init(|| {
        Regex::new(r":prefix_link:`([^`<]+?)\s*<([^>`]+)>`").expect("prefix link regex should compile")
    })
}

fn doc_role_re() -> &'static Regex {
    DOC_ROLE.get_or_init(|| {
        Regex::new(r":doc:`([^`<]+?)(?:\s*<([^>`]+)>)?`").expect("doc role regex should compile")
    })
}

fn ref_role_re() -> &'static Regex {
    REF_ROLE.get_or_init(|| {
        Regex::new(r":ref:`([^`<]+?)(?:\s*<([^>`]+)>)?`").expect("ref role regex should compile")
    })
}

/// Convert roles and double-backquote code spans.
///
/// `:obj:` becomes a plain code span, `:class:`/`:func:`/`:meth:` become the
/// ``[`name`]`` cross-reference marker and `:math:` becomes inline TeX.
/// Single-backquote spans are already valid inline code and stay as they are.
pub fn convert_rst_formatting(text: &str) -> String {
    let text = obj_role_re().replace_all(text, "`$1`");
    let text = xref_role_re().replace_all(&text, "[`$1`]");
    let text = math_role_re().replace_all(&text, r"\\(${1}\\)");

    let mut text = text.into_owned();
    while double_backquotes_re().is_match(&text) {
        text = double_backquotes_re()
            .replace_all(&text, |caps: &Captures| {
                format!("{}`{}`{}", &caps[1], join_span_lines(&caps[2]), &caps[3])
            })
            .into_owned();
    }
    text
}

fn join_span_lines(code: &str) -> String {
    if !code.contains('\n') {
        return code.to_string();
    }
    code.split('\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert external links and the `:prefix_link:`, `:doc:` and `:ref:` roles.
pub fn convert_rst_links(text: &str, page_info: &PageInfo) -> String {
    let text = prefix_link_re().replace_all(text, |caps: &Captures| {
        format!(
            "[{}](https://github.com/{}/{}/blob/main/{})",
            &caps[1],
            page_info.repo_owner,
            page_info.repo_name,
            caps[2].trim_start_matches('/')
        )
    });

    let text = doc_role_re().replace_all(&text, |caps: &Captures| {
        let target = caps.get(2).map_or(&caps[1], |m| m.as_str());
        format!(
            "[{}]({}/{})",
            &caps[1],
            page_info.docs_base(),
            strip_html_suffix(target.trim_start_matches('/'))
        )
    });

    let text = ref_role_re().replace_all(&text, |caps: &Captures| {
        let anchor = caps.get(2).map_or(&caps[1], |m| m.as_str());
        match &page_info.page {
            Some(page) => format!(
                "[{}]({}/{}#{})",
                &caps[1],
                page_info.docs_base(),
                page.strip_suffix(".html").unwrap_or(page),
                anchor
            ),
            None => format!("[{}](#{})", &caps[1], anchor),
        }
    });

    external_link_re()
        .replace_all(&text, |caps: &Captures| {
            let url = &caps[2];
            let url = if url.contains("://") {
                url.to_string()
            } else {
                strip_html_suffix(url)
            };
            format!("[{}]({})", &caps[1], url)
        })
        .into_owned()
}

/// Drop a `.html` suffix from the path part of a relative URL.
fn strip_html_suffix(url: &str) -> String {
    let (path, fragment) = match url.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (url, None),
    };
    let path = path.strip_suffix(".html").unwrap_or(path);
    match fragment {
        Some(fragment) => format!("{}#{}", path, fragment),
        None => path.to_string(),
    }
}

/// Full inline pass over prose, leaving fenced code alone.
pub fn convert_inline(text: &str, page_info: &PageInfo) -> String {
    map_prose(text, |prose| {
        convert_rst_links(&convert_rst_formatting(prose), page_info)
    })
}
