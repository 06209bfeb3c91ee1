//! Second-pass rewriting of `` [`Name`] `` references into links.

use std::sync::OnceLock;

use regex::Regex;

use super::anchors::AnchorMap;
use crate::autodoc::canonical_anchor;
use crate::markup::scan::map_prose;
use crate::symbols::{SymbolKind, SymbolTable};
use crate::types::PageInfo;

static REFERENCE: OnceLock<Regex> = OnceLock::new();

fn reference_re() -> &'static Regex {
    REFERENCE.get_or_init(|| Regex::new(r"\[`([^`]+)`\]").expect("reference regex should compile"))
}

/// Resolve one reference body (the text between the backticks).
///
/// Anything that cannot be linked degrades to a code span.
pub fn resolve_reference(
    reference: &str,
    table: &dyn SymbolTable,
    anchors: &AnchorMap,
    page_info: &PageInfo,
) -> String {
    let (object, param) = match reference.split_once('#') {
        Some((object, param)) => (object, Some(param)),
        None => (reference, None),
    };
    let (lookup, short) = match object.strip_prefix('~') {
        Some(path) => (path, true),
        None => (object, false),
    };
    let display = if short {
        lookup.rsplit('.').next().unwrap_or(lookup)
    } else {
        lookup
    };

    let Some(id) = table.resolve(lookup) else {
        return format!("`{}`", param.unwrap_or(display));
    };
    let anchor = canonical_anchor(table, id);
    let Some(target) = anchors.get(&anchor) else {
        return format!("`{}`", param.unwrap_or(display));
    };
    let link = target.link(&anchor, page_info);

    match param {
        Some(param) => format!("[{}]({}.{})", param, link, param),
        None if table.entry(id).kind == SymbolKind::Class => format!("[{}]({})", display, link),
        None => format!("[{}()]({})", display, link),
    }
}

/// Rewrite every reference outside code blocks. References already followed
/// by `(url)` are links and stay as they are.
pub fn resolve_links_in_text(
    text: &str,
    table: &dyn SymbolTable,
    anchors: &AnchorMap,
    page_info: &PageInfo,
) -> String {
    map_prose(text, |prose| {
        let mut out = String::with_capacity(prose.len());
        let mut last = 0;
        for caps in reference_re().captures_iter(prose) {
            let Some(whole) = caps.get(0) else { continue };
            if prose[whole.end()..].starts_with('(') {
                continue;
            }
            out.push_str(&prose[last..whole.start()]);
            out.push_str(&resolve_reference(&caps[1], table, anchors, page_info));
            last = whole.end();
        }
        out.push_str(&prose[last..]);
        out
    })
}
