//! `[[autodoc]]` directives inside converted pages.

use std::sync::OnceLock;

use regex::Regex;

use super::render::{autodoc, ObjectAnchor, RenderedPart};
use crate::markup::scan::{autodoc_target, find_indent, is_empty_line, method_item, FenceState};
use crate::symbols::SymbolTable;
use crate::types::{PageError, PageInfo};

static EXPLICIT_ID: OnceLock<Regex> = OnceLock::new();

fn explicit_id_re() -> &'static Regex {
    EXPLICIT_ID.get_or_init(|| {
        Regex::new(r"\[\[[^\]]+\]\]\s*$").expect("explicit id regex should compile")
    })
}

/// One `[[autodoc]] path` line and its optional method list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub object: String,
    /// `None` when no `- name` list follows: the default method set applies.
    pub methods: Option<Vec<String>>,
    /// 0-based line of the directive.
    pub line: usize,
}

/// Parse the directive starting at `lines[idx]`. Returns it with the index
/// of the first line after it.
///
/// The method list is the run of `- name` lines indented deeper than the
/// directive, blank lines allowed in between. Blank lines after the last
/// item stay in the page.
pub fn parse_directive(lines: &[&str], idx: usize) -> Option<(Directive, usize)> {
    let object = autodoc_target(lines.get(idx)?)?.to_string();
    let indent = find_indent(lines[idx]);

    let mut methods = Vec::new();
    let mut item_indent = None;
    let mut next = idx + 1;
    let mut cursor = idx + 1;
    while cursor < lines.len() {
        let line = lines[cursor];
        if is_empty_line(line) {
            cursor += 1;
            continue;
        }
        let line_indent = find_indent(line);
        let Some(name) = method_item(line) else { break };
        let expected = *item_indent.get_or_insert(line_indent);
        if line_indent <= indent || line_indent != expected {
            break;
        }
        methods.push(name.to_string());
        cursor += 1;
        next = cursor;
    }

    let directive = Directive {
        object,
        methods: (!methods.is_empty()).then_some(methods),
        line: idx,
    };
    Some((directive, next))
}

/// A page with its directives replaced by documentation.
#[derive(Debug, Clone, Default)]
pub struct AutodocPage {
    pub text: String,
    pub anchors: Vec<ObjectAnchor>,
    /// Standalone object components, in page order.
    pub parts: Vec<RenderedPart>,
    pub warnings: Vec<String>,
    pub errors: Vec<PageError>,
}

/// Expand every `[[autodoc]]` directive of a page.
///
/// The anchor of the first object after a heading is appended to that
/// heading as `[[anchor]]` unless the heading already carries an id. A
/// directive whose object or method cannot be found is dropped from the
/// page and reported in `errors`.
pub fn resolve_autodoc(text: &str, table: &dyn SymbolTable, page_info: &PageInfo) -> AutodocPage {
    let lines: Vec<&str> = text.split('\n').collect();
    let file = page_info.path.clone().unwrap_or_default();
    let mut page = AutodocPage::default();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut fence = FenceState::new();
    let mut last_heading: Option<usize> = None;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if !fence.in_code() {
            if let Some((directive, next)) = parse_directive(&lines, idx) {
                match autodoc(table, &directive.object, directive.methods.as_deref(), page_info) {
                    Ok(doc) => {
                        if let Some(heading) = last_heading.take() {
                            if !explicit_id_re().is_match(&out[heading]) {
                                out[heading] = format!("{}[[{}]]", out[heading].trim_end(), doc.anchor);
                            }
                        }
                        page.anchors.extend(doc.anchors);
                        page.parts.extend(doc.parts);
                        page.warnings.extend(doc.warnings);
                        out.push(doc.text);
                    }
                    Err(e) => page
                        .errors
                        .push(PageError::new(file.clone(), e.to_string()).at_line(directive.line + 1)),
                }
                idx = next;
                continue;
            }
        }

        let in_code = fence.update(idx, line);
        out.push(line.to_string());
        if !in_code && line.starts_with('#') {
            last_heading = Some(out.len() - 1);
        }
        idx += 1;
    }

    page.text = out.join("\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::convert_rst_to_mdx;
    use crate::symbols::{PythonExtractor, SourceFile, SymbolIndex};

    fn index() -> SymbolIndex {
        let files = vec![
            SourceFile::new("pkg/__init__.py", "from .foo import Foo, helper\n"),
            SourceFile::new(
                "pkg/foo.py",
                r#"class Foo:
    """A foo."""

    def bar(self):
        """Compute bar."""

    def baz(self):
        """Compute baz."""


def helper(x):
    """Help."""
"#,
            ),
        ];
        PythonExtractor::new("pkg").extract(&files).unwrap()
    }

    #[test]
    fn test_parse_directive_methods() {
        let lines = vec!["[[autodoc]] pkg.Foo", "    - bar", "", "    - baz", "", "Text"];
        let (directive, next) = parse_directive(&lines, 0).unwrap();
        assert_eq!(directive.object, "pkg.Foo");
        assert_eq!(directive.methods, Some(vec!["bar".to_string(), "baz".to_string()]));
        assert_eq!(next, 4);

        let lines = vec!["[[autodoc]] pkg.helper", "", "- not a method", "Text"];
        let (directive, next) = parse_directive(&lines, 0).unwrap();
        assert_eq!(directive.methods, None);
        assert_eq!(next, 1);

        assert!(parse_directive(&lines, 3).is_none());
    }

    #[test]
    fn test_rst_autoclass_end_to_end() {
        let page_info = PageInfo::new("pkg").for_page("foo.html", "docs/foo.rst");
        let rst = "Foo\n===\n\n.. autoclass:: pkg.Foo\n    :members:\n";
        let mdx = convert_rst_to_mdx(rst, &page_info).unwrap();
        assert!(mdx.contains("[[autodoc]] pkg.Foo\n    - all"));

        let page = resolve_autodoc(&mdx, &index(), &page_info);
        assert!(page.errors.is_empty());
        assert!(page.text.contains("# Foo[[pkg.Foo]]"));
        assert!(page.text.contains("<anchor>pkg.Foo</anchor>"));
        assert!(page.text.contains("<anchor>pkg.Foo.bar</anchor>"));
        assert!(page.text.contains("<anchor>pkg.Foo.baz</anchor>"));
        assert!(!page.text.contains("[[autodoc]]"));
        let anchors: Vec<&str> = page.anchors.iter().map(|a| a.anchor.as_str()).collect();
        assert_eq!(anchors, vec!["pkg.Foo", "pkg.Foo.bar", "pkg.Foo.baz"]);
    }

    #[test]
    fn test_heading_with_explicit_id_is_kept() {
        let page_info = PageInfo::new("pkg");
        let text = "## Helpers[[helpers]]\n\n[[autodoc]] pkg.helper\n\n[[autodoc]] pkg.Foo\n    - bar";
        let page = resolve_autodoc(text, &index(), &page_info);
        assert!(page.text.starts_with("## Helpers[[helpers]]\n\n<div class=\"docstring\">"));
        assert!(page.text.contains("<name>pkg.helper</name>"));
        assert!(!page.text.contains("<anchor>pkg.Foo.baz</anchor>"));
        assert_eq!(page.parts.len(), 3);
    }

    #[test]
    fn test_missing_object_is_reported() {
        let page_info = PageInfo::new("pkg").for_page("api.html", "docs/api.md");
        let text = "# API\n\n[[autodoc]] pkg.Missing\n\n[[autodoc]] pkg.Foo\n    - nope\n\nEnd";
        let page = resolve_autodoc(text, &index(), &page_info);
        assert_eq!(page.errors.len(), 2);
        assert_eq!(page.errors[0].line, Some(3));
        assert_eq!(page.errors[1].line, Some(5));
        assert_eq!(page.text, "# API\n\n\n\nEnd");
        assert!(page.anchors.is_empty());
    }
}
