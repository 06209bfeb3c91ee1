//! Documentation components for single objects.

use serde::Serialize;
use tracing::warn;

use crate::markup::scan::{check_fences, find_indent, is_empty_line, is_fence};
use crate::markup::{parse_docstring, Converter, Dialect, DocstringSections};
use crate::symbols::{Parameter, SymbolId, SymbolKind, SymbolTable};
use crate::types::{DocError, PageInfo};

/// An anchor contributed by a documented object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAnchor {
    pub anchor: String,
    /// Set for aliases: the fragment on the same page that documents the object.
    pub alias_of: Option<String>,
}

impl ObjectAnchor {
    pub fn primary(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            alias_of: None,
        }
    }

    pub fn alias(anchor: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            alias_of: Some(target.into()),
        }
    }
}

/// One object rendered on its own, without nested members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPart {
    pub anchor: String,
    pub component: String,
}

/// Result of documenting one object, and its methods for a class.
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    pub anchor: String,
    /// Full component, method components nested inside the class one.
    pub text: String,
    /// The object and then each method, as standalone components.
    pub parts: Vec<RenderedPart>,
    pub anchors: Vec<ObjectAnchor>,
    /// Recoverable problems (malformed examples).
    pub warnings: Vec<String>,
}

/// Shortest public path of a symbol.
///
/// Walks the defining module's path from the package root and stops at the
/// first module on which the symbol's top-level name resolves to the same object.
pub fn canonical_anchor(table: &dyn SymbolTable, id: SymbolId) -> String {
    let entry = table.entry(id);
    if entry.qualname.is_empty() {
        return entry.module.clone();
    }
    let first = entry
        .qualname
        .split('.')
        .next()
        .unwrap_or(entry.qualname.as_str());
    let Some(target) = table
        .resolve(&entry.module)
        .and_then(|module| table.get_attr(module, first))
    else {
        return entry.path();
    };

    let segments: Vec<&str> = entry.module.split('.').collect();
    for end in 1..=segments.len() {
        let prefix = segments[..end].join(".");
        let found = table
            .resolve(&prefix)
            .and_then(|module| table.get_attr(module, first));
        if found == Some(target) {
            return format!("{}.{}", prefix, entry.qualname);
        }
    }
    entry.path()
}

/// Link to the definition in the repository at the configured tag.
pub fn source_link(table: &dyn SymbolTable, id: SymbolId, page_info: &PageInfo) -> Option<String> {
    table
        .source_location(id)
        .map(|location| format!("{}{}#L{}", page_info.source_base(), location.file, location.line))
}

#[derive(Serialize)]
struct SignatureParam<'a> {
    name: &'a str,
    val: String,
}

/// Signature as the JSON list the site component reads.
pub fn signature_json(params: &[Parameter]) -> Result<String, DocError> {
    let entries: Vec<SignatureParam> = params
        .iter()
        .map(|param| {
            let mut val = String::new();
            if let Some(annotation) = &param.annotation {
                val.push_str(": ");
                val.push_str(annotation);
            }
            if let Some(default) = &param.default {
                val.push_str(" = ");
                val.push_str(default);
            }
            SignatureParam {
                name: &param.name,
                val: val.replace('<', "&lt;").replace('{', "&lcub;"),
            }
        })
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

/// Public methods with a docstring of their own.
///
/// A method is dropped when some ancestor exposes the same name with the
/// exact same docstring, which also drops methods inherited unchanged.
pub fn find_documented_methods(table: &dyn SymbolTable, class: SymbolId) -> Vec<String> {
    let mro = table.mro(class);
    let ancestors = mro.get(1..).unwrap_or(&[]);

    table
        .attributes(class)
        .into_iter()
        .filter(|name| !name.starts_with('_'))
        .filter(|name| {
            let Some(method) = table.get_attr(class, name) else {
                return false;
            };
            if !table.entry(method).kind.is_callable() {
                return false;
            }
            let Some(doc) = table.raw_docstring(method).filter(|doc| !doc.is_empty()) else {
                return false;
            };
            !ancestors.iter().any(|ancestor| {
                table
                    .get_attr(*ancestor, name)
                    .and_then(|inherited| table.raw_docstring(inherited))
                    == Some(doc)
            })
        })
        .collect()
}

/// Wrap fenced examples introduced by an "Example:" line so they get a hash link.
pub fn add_example_hashlinks(text: &str, anchor: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut wrapping = false;
    let mut count = 0;
    let mut intro: Option<&str> = None;

    for line in text.split('\n') {
        if is_fence(line) {
            if in_fence {
                in_fence = false;
                out.push(line.to_string());
                if wrapping {
                    out.push(String::new());
                    out.push("</ExampleCodeBlock>".to_string());
                    wrapping = false;
                }
                intro = None;
                continue;
            }
            in_fence = true;
            let intro_line = intro.map(str::trim_end).unwrap_or("");
            if find_indent(line) == 0
                && intro_line.ends_with(':')
                && intro_line.to_lowercase().contains("example")
            {
                count += 1;
                let id = if count == 1 {
                    format!("{}.example", anchor)
                } else {
                    format!("{}.example-{}", anchor, count)
                };
                out.push(format!("<ExampleCodeBlock anchor=\"{}\">", id));
                out.push(String::new());
                wrapping = true;
            }
            out.push(line.to_string());
            continue;
        }
        if !in_fence && !is_empty_line(line) {
            intro = Some(line);
        }
        out.push(line.to_string());
    }

    out.join("\n")
}

fn convert_piece(converter: &dyn Converter, text: &str, page_info: &PageInfo) -> Result<String, DocError> {
    Ok(converter.convert(text, page_info)?.trim().to_string())
}

/// The `<paramsdesc>`... `<raisederrors>` tags of a component header.
fn render_sections(
    sections: &DocstringSections,
    converter: &dyn Converter,
    page_info: &PageInfo,
) -> Result<String, DocError> {
    let mut out = String::new();
    let mut titled = 0;
    for group in &sections.params {
        let text = convert_piece(converter, &group.text, page_info)?;
        match &group.title {
            None => out.push_str(&format!("<paramsdesc>{}</paramsdesc>", text)),
            Some(title) => {
                titled += 1;
                out.push_str(&format!(
                    "<paramsdesc{n}title>{}</paramsdesc{n}title><paramsdesc{n}>{}</paramsdesc{n}>",
                    title,
                    text,
                    n = titled
                ));
            }
        }
    }
    out.push_str(&format!("<paramgroups>{}</paramgroups>", titled));

    let tags = [
        ("rettype", &sections.return_type),
        ("retdesc", &sections.returns),
        ("yieldtype", &sections.yield_type),
        ("yielddesc", &sections.yields),
        ("raises", &sections.raises),
        ("raisederrors", &sections.raised_errors),
    ];
    for (tag, value) in tags {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            let text = convert_piece(converter, value, page_info)?;
            out.push_str(&format!("<{tag}>{}</{tag}>", text, tag = tag));
        }
    }
    Ok(out)
}

/// Header and converted description of one object.
fn render_object(
    table: &dyn SymbolTable,
    id: SymbolId,
    anchor: &str,
    name: &str,
    page_info: &PageInfo,
    warnings: &mut Vec<String>,
) -> Result<(String, String), DocError> {
    let mut header = format!(
        "<name>{}</name><anchor>{}</anchor><source>{}</source><parameters>{}</parameters>",
        name,
        anchor,
        source_link(table, id, page_info).unwrap_or_default(),
        signature_json(&table.signature(id))?
    );

    let Some(doc) = table.docstring(id) else {
        return Ok((header, String::new()));
    };
    let converter = Dialect::detect(&doc).converter();
    let sections = parse_docstring(&doc);
    header.push_str(&render_sections(&sections, converter, page_info)?);

    let description = convert_piece(converter, &sections.description, page_info)?;
    let description = match check_fences(&description) {
        Ok(()) => add_example_hashlinks(&description, anchor),
        Err(e) => {
            warn!(object = %anchor, error = %e, "malformed example in docstring");
            warnings.push(format!("{}: {}", anchor, e));
            description
        }
    };
    Ok((header, description))
}

fn wrap_component(header: &str, description: &str, nested: &[String]) -> String {
    let mut out = format!(
        "<div class=\"docstring\">\n\n<docstring>{}</docstring>\n{}\n",
        header, description
    );
    for component in nested {
        out.push('\n');
        out.push_str(component);
        out.push('\n');
    }
    out.push_str("\n</div>");
    out
}

fn method_list(
    table: &dyn SymbolTable,
    class: SymbolId,
    object: &str,
    requested: Option<&[String]>,
) -> Result<Vec<String>, DocError> {
    let Some(requested) = requested else {
        return Ok(find_documented_methods(table, class));
    };
    let mut methods: Vec<String> = requested
        .iter()
        .filter(|m| m.as_str() != "all")
        .cloned()
        .collect();
    if let Some(missing) = methods.iter().find(|m| table.get_attr(class, m).is_none()) {
        return Err(DocError::MethodNotFound {
            method: missing.clone(),
            object: object.to_string(),
        });
    }
    if requested.iter().any(|m| m == "all") {
        for method in find_documented_methods(table, class) {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
    }
    Ok(methods)
}

/// Document `object` and, for a class, its methods.
///
/// `methods` is the explicit method list of the directive, if any. The
/// sentinel `all` adds the default set after the listed methods.
pub fn autodoc(
    table: &dyn SymbolTable,
    object: &str,
    methods: Option<&[String]>,
    page_info: &PageInfo,
) -> Result<Documentation, DocError> {
    let id = table.resolve(object).ok_or_else(|| DocError::ObjectNotFound {
        object: object.to_string(),
        package: table.package_name().to_string(),
    })?;
    let anchor = canonical_anchor(table, id);
    let kind = table.entry(id).kind;
    let name = match kind {
        SymbolKind::Class => format!("class {}", anchor),
        _ => anchor.clone(),
    };

    let mut doc = Documentation {
        anchor: anchor.clone(),
        anchors: vec![ObjectAnchor::primary(anchor.clone())],
        ..Default::default()
    };
    let (header, description) = render_object(table, id, &anchor, &name, page_info, &mut doc.warnings)?;
    doc.parts.push(RenderedPart {
        anchor: anchor.clone(),
        component: wrap_component(&header, &description, &[]),
    });

    let mut nested = Vec::new();
    if kind == SymbolKind::Class {
        for method in method_list(table, id, object, methods)? {
            let Some(method_id) = table.get_attr(id, &method) else {
                continue;
            };
            let method_anchor = format!("{}.{}", anchor, method);
            let (header, description) =
                render_object(table, method_id, &method_anchor, &method, page_info, &mut doc.warnings)?;
            let component = wrap_component(&header, &description, &[]);

            doc.anchors.push(ObjectAnchor::primary(method_anchor.clone()));
            let canonical = canonical_anchor(table, method_id);
            if canonical != method_anchor {
                doc.anchors.push(ObjectAnchor::alias(canonical, method_anchor.clone()));
            }
            doc.parts.push(RenderedPart {
                anchor: method_anchor,
                component: component.clone(),
            });
            nested.push(component);
        }
    }

    doc.text = wrap_component(&header, &description, &nested);
    Ok(doc)
}
