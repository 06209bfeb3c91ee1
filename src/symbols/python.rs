//! Python symbol extraction using tree-sitter.
//!
//! Builds a [`SymbolIndex`] from the source files of one package:
//! - modules, with submodules bound on their parent package
//! - classes and their bases
//! - functions, methods and properties with their parameters
//! - raw docstrings (first string literal of a body)
//! - module-level imports, so re-exported names resolve where they are exported

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};
use tree_sitter::{Node, Parser};

use super::error::SymbolError;
use super::table::{Parameter, SymbolEntry, SymbolId, SymbolIndex, SymbolKind, SymbolTable};

/// One Python source file of the package.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Dotted module path (`pkg.models.bert`).
    pub module: String,
    /// Path relative to the directory holding the package (`pkg/models/bert.py`).
    pub file: String,
    /// True for `__init__.py`.
    pub is_package: bool,
    pub source: String,
}

impl SourceFile {
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        let file = file.into();
        let stem = file.strip_suffix(".py").unwrap_or(&file);
        let mut segments: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
        let is_package = segments.last() == Some(&"__init__");
        if is_package {
            segments.pop();
        }
        Self {
            module: segments.join("."),
            file: file.clone(),
            is_package,
            source: source.into(),
        }
    }

    /// Package that relative imports in this file start from.
    fn import_base(&self) -> &str {
        if self.is_package {
            &self.module
        } else {
            self.module.rsplit_once('.').map_or("", |(parent, _)| parent)
        }
    }
}

#[derive(Debug)]
struct ParsedModule {
    module: String,
    file: String,
    docstring: Option<String>,
    definitions: Vec<Definition>,
    imports: Vec<Import>,
}

#[derive(Debug)]
struct Definition {
    name: String,
    line: usize,
    docstring: Option<String>,
    kind: DefinitionKind,
}

#[derive(Debug)]
enum DefinitionKind {
    Class {
        bases: Vec<String>,
        body: Vec<Definition>,
    },
    Function {
        params: Vec<Parameter>,
        is_property: bool,
    },
}

#[derive(Debug)]
enum Import {
    /// `from module import name as alias`, or `from module import *`.
    From {
        module: String,
        names: Vec<(String, String)>,
        wildcard: bool,
    },
    /// `import target as binding`.
    Module { binding: String, target: String },
}

/// Extracts a [`SymbolIndex`] from Python sources.
pub struct PythonExtractor {
    package_name: String,
}

impl PythonExtractor {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
        }
    }

    fn create_parser() -> Result<Parser, SymbolError> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|e| SymbolError::TreeSitter(e.to_string()))?;
        Ok(parser)
    }

    /// Index the package rooted at `package_dir`. The directory name is the package name.
    pub fn extract_dir(package_dir: &Path) -> Result<SymbolIndex, SymbolError> {
        if !package_dir.is_dir() {
            return Err(SymbolError::InvalidPackage(package_dir.display().to_string()));
        }
        let package_name = package_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SymbolError::InvalidPackage(package_dir.display().to_string()))?;
        let parent = package_dir.parent().unwrap_or(Path::new(""));

        let pattern = format!("{}/**/*.py", package_dir.display());
        let paths = glob::glob(&pattern).map_err(|e| SymbolError::InvalidPackage(e.to_string()))?;

        let mut files = Vec::new();
        for path in paths {
            let path = path.map_err(std::io::Error::from)?;
            if path.components().any(|c| c.as_os_str() == "__pycache__") {
                continue;
            }
            let relative = path.strip_prefix(parent).unwrap_or(&path);
            let file = relative.to_string_lossy().replace('\\', "/");
            let source = std::fs::read_to_string(&path)?;
            files.push(SourceFile::new(file, source));
        }

        Self::new(package_name).extract(&files)
    }

    /// Index in-memory sources. Files outside the package are ignored.
    pub fn extract(&self, files: &[SourceFile]) -> Result<SymbolIndex, SymbolError> {
        let prefix = format!("{}.", self.package_name);
        let mut parsed: Vec<ParsedModule> = files
            .par_iter()
            .filter(|f| f.module == self.package_name || f.module.starts_with(&prefix))
            .map(parse_module)
            .collect::<Result<_, _>>()?;
        parsed.sort_by(|a, b| a.module.cmp(&b.module));

        let mut builder = IndexBuilder::new(&self.package_name);
        for module in &parsed {
            builder.add_module(module);
        }
        builder.resolve_imports(&parsed);
        builder.resolve_bases();

        info!(
            package = %self.package_name,
            modules = parsed.len(),
            symbols = builder.index.len(),
            "extracted symbol index"
        );
        Ok(builder.index)
    }
}

fn parse_module(file: &SourceFile) -> Result<ParsedModule, SymbolError> {
    let mut parser = PythonExtractor::create_parser()?;
    let tree = parser
        .parse(&file.source, None)
        .ok_or_else(|| SymbolError::ParseError(format!("failed to parse {}", file.file)))?;
    let root = tree.root_node();
    let source = file.source.as_str();

    let mut module = ParsedModule {
        module: file.module.clone(),
        file: file.file.clone(),
        docstring: block_docstring(root, source),
        definitions: Vec::new(),
        imports: Vec::new(),
    };
    collect_statements(
        root,
        source,
        file.import_base(),
        &mut module.definitions,
        &mut module.imports,
    );
    debug!(
        module = %module.module,
        definitions = module.definitions.len(),
        imports = module.imports.len(),
        "parsed module"
    );
    Ok(module)
}

fn node_text(node: Node, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes()).ok().map(|s| s.to_string())
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node_text(node.child_by_field_name(field)?, source)
}

/// Module-level statements, looking inside `if`/`try` blocks.
fn collect_statements(
    node: Node,
    source: &str,
    import_base: &str,
    definitions: &mut Vec<Definition>,
    imports: &mut Vec<Import>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" | "decorated_definition" => {
                if let Some(definition) = parse_definition(child, source) {
                    definitions.push(definition);
                }
            }
            "import_statement" => imports.extend(parse_import(child, source)),
            "import_from_statement" => {
                if let Some(import) = parse_from_import(child, source, import_base) {
                    imports.push(import);
                }
            }
            "if_statement" | "try_statement" | "block" | "else_clause" | "elif_clause"
            | "except_clause" | "finally_clause" => {
                collect_statements(child, source, import_base, definitions, imports)
            }
            _ => {}
        }
    }
}

fn parse_definition(node: Node, source: &str) -> Option<Definition> {
    let line = node.start_position().row + 1;
    let (node, decorators) = if node.kind() == "decorated_definition" {
        let mut cursor = node.walk();
        let decorators: Vec<String> = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "decorator")
            .filter_map(|child| node_text(child, source))
            .map(|text| text.trim_start_matches('@').trim().to_string())
            .collect();
        (node.child_by_field_name("definition")?, decorators)
    } else {
        (node, Vec::new())
    };

    let name = field_text(node, "name", source)?;
    let body = node.child_by_field_name("body")?;
    let docstring = block_docstring(body, source);

    let kind = match node.kind() {
        "class_definition" => DefinitionKind::Class {
            bases: node
                .child_by_field_name("superclasses")
                .map(|args| parse_bases(args, source))
                .unwrap_or_default(),
            body: class_body(body, source),
        },
        "function_definition" => {
            if decorators
                .iter()
                .any(|d| d.ends_with(".setter") || d.ends_with(".deleter"))
            {
                return None;
            }
            let is_property = decorators
                .iter()
                .any(|d| d == "property" || d == "cached_property" || d.ends_with(".cached_property"));
            DefinitionKind::Function {
                params: node
                    .child_by_field_name("parameters")
                    .map(|params| parse_parameters(params, source))
                    .unwrap_or_default(),
                is_property,
            }
        }
        _ => return None,
    };

    Some(Definition {
        name,
        line,
        docstring,
        kind,
    })
}

fn class_body(body: Node, source: &str) -> Vec<Definition> {
    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter(|child| {
            matches!(
                child.kind(),
                "function_definition" | "class_definition" | "decorated_definition"
            )
        })
        .filter_map(|child| parse_definition(child, source))
        .collect()
}

/// Base-class expressions as dotted names. Keyword arguments such as `metaclass=` are skipped.
fn parse_bases(args: Node, source: &str) -> Vec<String> {
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter_map(|child| match child.kind() {
            "identifier" | "attribute" => node_text(child, source),
            "subscript" => field_text(child, "value", source),
            _ => None,
        })
        .collect()
}

fn parse_parameters(node: Node, source: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let param = match child.kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                let Some(name) = node_text(child, source) else { continue };
                Parameter::new(name)
            }
            "typed_parameter" => {
                let Some(name) = child.named_child(0).and_then(|n| node_text(n, source)) else {
                    continue;
                };
                Parameter {
                    name,
                    annotation: field_text(child, "type", source).map(|t| one_line(&t)),
                    default: None,
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                let Some(name) = field_text(child, "name", source) else { continue };
                Parameter {
                    name,
                    annotation: field_text(child, "type", source).map(|t| one_line(&t)),
                    default: field_text(child, "value", source).map(|v| one_line(&v)),
                }
            }
            // bare `*` and `/` separators, comments
            _ => continue,
        };
        params.push(param);
    }
    params
}

fn one_line(text: &str) -> String {
    if text.contains('\n') {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        text.to_string()
    }
}

/// Raw docstring of a module or body: its first statement when that is a string literal.
fn block_docstring(block: Node, source: &str) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    string_content(&node_text(literal, source)?)
}

/// Body of a string literal without prefix and quotes.
fn string_content(literal: &str) -> Option<String> {
    let literal = literal.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    ["\"\"\"", "'''", "\"", "'"].iter().find_map(|quote| {
        literal
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
            .map(str::to_string)
    })
}

fn parse_import(node: Node, source: &str) -> Vec<Import> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .filter_map(|child| match child.kind() {
            "dotted_name" => {
                let path = node_text(child, source)?;
                let first = path.split('.').next()?.to_string();
                Some(Import::Module {
                    binding: first.clone(),
                    target: first,
                })
            }
            "aliased_import" => Some(Import::Module {
                binding: field_text(child, "alias", source)?,
                target: field_text(child, "name", source)?,
            }),
            _ => None,
        })
        .collect()
}

fn parse_from_import(node: Node, source: &str, import_base: &str) -> Option<Import> {
    let module_node = node.child_by_field_name("module_name")?;
    let module = absolute_module(&node_text(module_node, source)?, import_base)?;

    let mut names = Vec::new();
    let mut wildcard = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.id() == module_node.id() {
            continue;
        }
        match child.kind() {
            "wildcard_import" => wildcard = true,
            "dotted_name" => {
                if let Some(name) = node_text(child, source) {
                    names.push((name.clone(), name));
                }
            }
            "aliased_import" => {
                if let (Some(name), Some(alias)) = (
                    field_text(child, "name", source),
                    field_text(child, "alias", source),
                ) {
                    names.push((name, alias));
                }
            }
            _ => {}
        }
    }

    Some(Import::From {
        module,
        names,
        wildcard,
    })
}

/// Absolute dotted path of a possibly relative import target.
fn absolute_module(raw: &str, import_base: &str) -> Option<String> {
    let level = raw.chars().take_while(|c| *c == '.').count();
    let rest = &raw[level..];
    if level == 0 {
        return Some(rest.to_string());
    }
    let mut base: Vec<&str> = import_base.split('.').filter(|s| !s.is_empty()).collect();
    for _ in 1..level {
        base.pop()?;
    }
    if base.is_empty() {
        return None;
    }
    let mut module = base.join(".");
    if !rest.is_empty() {
        module.push('.');
        module.push_str(rest);
    }
    Some(module)
}

struct IndexBuilder {
    index: SymbolIndex,
    modules: HashMap<String, SymbolId>,
    /// (class, defining module, base expressions)
    pending_bases: Vec<(SymbolId, SymbolId, Vec<String>)>,
}

impl IndexBuilder {
    fn new(package_name: &str) -> Self {
        let index = SymbolIndex::new(package_name);
        let mut modules = HashMap::new();
        modules.insert(package_name.to_string(), index.root());
        Self {
            index,
            modules,
            pending_bases: Vec::new(),
        }
    }

    fn ensure_module(&mut self, path: &str) -> SymbolId {
        if let Some(id) = self.modules.get(path) {
            return *id;
        }
        let (parent, name) = path.rsplit_once('.').unwrap_or(("", path));
        let parent_id = if parent.is_empty() {
            self.index.root()
        } else {
            self.ensure_module(parent)
        };
        let id = self.index.push(SymbolEntry::new(name, SymbolKind::Module, path));
        self.index.set_member(parent_id, name, id);
        self.modules.insert(path.to_string(), id);
        id
    }

    fn add_module(&mut self, parsed: &ParsedModule) {
        let id = self.ensure_module(&parsed.module);
        let entry = self.index.entry_mut(id);
        entry.file = parsed.file.clone();
        entry.docstring = parsed.docstring.clone();

        for definition in &parsed.definitions {
            self.add_definition(id, id, &parsed.module, &parsed.file, "", definition);
        }
    }

    fn add_definition(
        &mut self,
        owner: SymbolId,
        module_id: SymbolId,
        module: &str,
        file: &str,
        parent_qualname: &str,
        definition: &Definition,
    ) {
        let in_class = !parent_qualname.is_empty();
        let qualname = if in_class {
            format!("{}.{}", parent_qualname, definition.name)
        } else {
            definition.name.clone()
        };

        let mut entry = SymbolEntry::new(definition.name.clone(), SymbolKind::Function, module);
        entry.qualname = qualname.clone();
        entry.file = file.to_string();
        entry.line = definition.line;
        entry.docstring = definition.docstring.clone();
        entry.kind = match &definition.kind {
            DefinitionKind::Class { .. } => SymbolKind::Class,
            DefinitionKind::Function { is_property: true, .. } if in_class => SymbolKind::Property,
            DefinitionKind::Function { .. } if in_class => SymbolKind::Method,
            DefinitionKind::Function { .. } => SymbolKind::Function,
        };
        if let DefinitionKind::Function { params, .. } = &definition.kind {
            entry.params = params.clone();
        }

        let id = self.index.push(entry);
        self.index.set_member(owner, definition.name.clone(), id);

        if let DefinitionKind::Class { bases, body } = &definition.kind {
            self.pending_bases.push((id, module_id, bases.clone()));
            for child in body {
                self.add_definition(id, module_id, module, file, &qualname, child);
            }
        }
    }

    /// Apply every import until no binding changes.
    fn resolve_imports(&mut self, parsed: &[ParsedModule]) {
        loop {
            let mut changed = false;
            for module in parsed {
                let Some(&owner) = self.modules.get(&module.module) else {
                    continue;
                };
                for import in &module.imports {
                    changed |= self.apply_import(owner, &module.module, import);
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn apply_import(&mut self, owner: SymbolId, owner_path: &str, import: &Import) -> bool {
        match import {
            Import::From {
                module,
                names,
                wildcard,
            } => {
                let Some(&source) = self.modules.get(module) else {
                    return false;
                };
                let mut bindings: Vec<(String, SymbolId)> = Vec::new();
                if *wildcard {
                    bindings.extend(
                        self.index
                            .entry(source)
                            .members
                            .iter()
                            .filter(|(name, _)| !name.starts_with('_'))
                            .map(|(name, id)| (name.clone(), *id)),
                    );
                }
                for (name, alias) in names {
                    let value = self
                        .index
                        .entry(source)
                        .members
                        .get(name)
                        .copied()
                        .or_else(|| self.modules.get(&format!("{}.{}", module, name)).copied());
                    if let Some(value) = value {
                        bindings.push((alias.clone(), value));
                    }
                }
                let mut changed = false;
                for (name, value) in bindings {
                    changed |= self.bind(owner, owner_path, &name, value);
                }
                changed
            }
            Import::Module { binding, target } => match self.modules.get(target) {
                Some(&value) => self.bind(owner, owner_path, binding, value),
                None => false,
            },
        }
    }

    /// Bind an imported name. Definitions win; the implicit binding of a
    /// submodule on its package gives way to an explicit import of the same name.
    fn bind(&mut self, owner: SymbolId, owner_path: &str, name: &str, value: SymbolId) -> bool {
        let current = self.index.entry(owner).members.get(name).copied();
        match current {
            None => self.index.add_member_if_absent(owner, name, value),
            Some(current) if current == value => false,
            Some(current) => {
                let entry = self.index.entry(current);
                let is_submodule = entry.kind == SymbolKind::Module
                    && entry.module == format!("{}.{}", owner_path, name);
                if is_submodule {
                    self.index.set_member(owner, name, value);
                }
                is_submodule
            }
        }
    }

    fn resolve_bases(&mut self) {
        let pending = std::mem::take(&mut self.pending_bases);
        for (class, module, names) in pending {
            let bases: Vec<SymbolId> = names
                .iter()
                .filter_map(|name| self.resolve_in(module, name))
                .filter(|id| *id != class && self.index.entry(*id).kind == SymbolKind::Class)
                .collect();
            self.index.entry_mut(class).bases = bases;
        }
    }

    /// Resolve a dotted expression in a module's namespace.
    fn resolve_in(&self, module: SymbolId, dotted: &str) -> Option<SymbolId> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let start = self
            .index
            .get_attr(module, first)
            .or_else(|| self.modules.get(first).copied())?;
        segments.try_fold(start, |owner, segment| self.index.get_attr(owner, segment))
    }
}
