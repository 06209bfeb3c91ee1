use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SymbolError;
use crate::markup::scan::{find_indent, strip_indent};

/// Index of an entry in a [`SymbolIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Property,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
        }
    }

    /// Functions and methods. Properties are read like attributes.
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "module" => Ok(SymbolKind::Module),
            "class" => Ok(SymbolKind::Class),
            "function" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "property" => Ok(SymbolKind::Property),
            _ => Err(format!("Unknown symbol kind: {}", s)),
        }
    }
}

/// One parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name with its `*`/`**` prefix for variadic parameters.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    /// Dotted path of the defining module.
    pub module: String,
    /// Path inside the module (`Foo.bar`). Empty for modules.
    pub qualname: String,
    /// Source file relative to the directory holding the package.
    pub file: String,
    /// 1-based line of the definition, decorators included.
    pub line: usize,
    /// Docstring as written, without the surrounding quotes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<SymbolId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, SymbolId>,
}

impl SymbolEntry {
    pub fn new(name: impl Into<String>, kind: SymbolKind, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            module: module.into(),
            qualname: String::new(),
            file: String::new(),
            line: 1,
            docstring: None,
            params: Vec::new(),
            bases: Vec::new(),
            members: BTreeMap::new(),
        }
    }

    /// Fully dotted path where the symbol is defined.
    pub fn path(&self) -> String {
        if self.qualname.is_empty() {
            self.module.clone()
        } else {
            format!("{}.{}", self.module, self.qualname)
        }
    }
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub module: String,
    pub file: String,
    pub line: usize,
}

/// Read access to the objects of one package.
///
/// Implementors supply lookup by id and attribute access; everything else
/// is derived from those.
pub trait SymbolTable: Send + Sync {
    fn package_name(&self) -> &str;

    fn root(&self) -> SymbolId;

    fn entry(&self, id: SymbolId) -> &SymbolEntry;

    /// Attribute `name` of `owner`. Classes search their MRO.
    fn get_attr(&self, owner: SymbolId, name: &str) -> Option<SymbolId>;

    /// Walk a dotted path from the package root. A leading package segment is optional.
    fn resolve(&self, path: &str) -> Option<SymbolId> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        let package = self.package_name();
        if path == package {
            return Some(self.root());
        }
        let rest = path
            .strip_prefix(package)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(path);
        rest.split('.')
            .try_fold(self.root(), |owner, segment| self.get_attr(owner, segment))
    }

    /// Parameters of a function, or of `__init__` for a class, without a leading `self`/`cls`.
    fn signature(&self, id: SymbolId) -> Vec<Parameter> {
        let target = match self.entry(id).kind {
            SymbolKind::Class => self.get_attr(id, "__init__"),
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Property => Some(id),
            SymbolKind::Module => None,
        };
        let Some(target) = target else {
            return Vec::new();
        };
        let params = &self.entry(target).params;
        match params.first() {
            Some(first) if first.name == "self" || first.name == "cls" => params[1..].to_vec(),
            _ => params.clone(),
        }
    }

    fn raw_docstring(&self, id: SymbolId) -> Option<&str> {
        self.entry(id).docstring.as_deref()
    }

    /// Docstring with quotes gone and common indentation removed.
    fn docstring(&self, id: SymbolId) -> Option<String> {
        self.raw_docstring(id)
            .map(clean_docstring)
            .filter(|doc| !doc.is_empty())
    }

    fn source_location(&self, id: SymbolId) -> Option<SourceLocation> {
        let entry = self.entry(id);
        if entry.file.is_empty() {
            return None;
        }
        Some(SourceLocation {
            module: entry.module.clone(),
            file: entry.file.clone(),
            line: entry.line,
        })
    }

    /// Method resolution order, the class itself first.
    fn mro(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut visiting = Vec::new();
        c3_linearize(self, id, &mut visiting).unwrap_or_else(|| depth_first_order(self, id))
    }

    /// Every attribute name reachable on `id`, sorted.
    fn attributes(&self, id: SymbolId) -> Vec<String> {
        let owners = match self.entry(id).kind {
            SymbolKind::Class => self.mro(id),
            _ => vec![id],
        };
        let names: BTreeSet<&String> = owners
            .iter()
            .flat_map(|owner| self.entry(*owner).members.keys())
            .collect();
        names.into_iter().cloned().collect()
    }
}

fn c3_linearize<T: SymbolTable + ?Sized>(
    table: &T,
    id: SymbolId,
    visiting: &mut Vec<SymbolId>,
) -> Option<Vec<SymbolId>> {
    if visiting.contains(&id) {
        return None;
    }
    visiting.push(id);
    let bases = &table.entry(id).bases;
    let mut seqs: Vec<Vec<SymbolId>> = Vec::with_capacity(bases.len() + 1);
    for base in bases {
        seqs.push(c3_linearize(table, *base, visiting)?);
    }
    seqs.push(bases.clone());
    visiting.pop();

    let mut result = vec![id];
    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            return Some(result);
        }
        let head = seqs
            .iter()
            .map(|seq| seq[0])
            .find(|candidate| !seqs.iter().any(|seq| seq[1..].contains(candidate)))?;
        result.push(head);
        for seq in seqs.iter_mut() {
            if seq[0] == head {
                seq.remove(0);
            }
        }
    }
}

fn depth_first_order<T: SymbolTable + ?Sized>(table: &T, id: SymbolId) -> Vec<SymbolId> {
    let mut order = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if order.contains(&current) {
            continue;
        }
        order.push(current);
        stack.extend(table.entry(current).bases.iter().rev());
    }
    order
}

/// Strip the uniform indentation of a docstring's continuation lines and the
/// blank lines around it.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| find_indent(line))
        .min()
        .unwrap_or(0);

    let cleaned: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.trim_start()
            } else if line.trim().is_empty() {
                ""
            } else {
                strip_indent(line, margin).trim_end()
            }
        })
        .collect();

    let start = cleaned.iter().position(|line| !line.is_empty()).unwrap_or(cleaned.len());
    let end = cleaned.iter().rposition(|line| !line.is_empty()).map_or(start, |i| i + 1);
    cleaned[start..end].join("\n")
}

/// Serializable arena of every symbol in a package. The package module is entry 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolIndex {
    pub package_name: String,
    pub entries: Vec<SymbolEntry>,
}

impl SymbolIndex {
    pub fn new(package_name: impl Into<String>) -> Self {
        let package_name = package_name.into();
        let root = SymbolEntry::new(package_name.clone(), SymbolKind::Module, package_name.clone());
        Self {
            package_name,
            entries: vec![root],
        }
    }

    pub fn push(&mut self, entry: SymbolEntry) -> SymbolId {
        self.entries.push(entry);
        SymbolId(self.entries.len() - 1)
    }

    pub fn entry_mut(&mut self, id: SymbolId) -> &mut SymbolEntry {
        &mut self.entries[id.0]
    }

    /// Bind `name` on `owner`, replacing any previous binding.
    pub fn set_member(&mut self, owner: SymbolId, name: impl Into<String>, id: SymbolId) {
        self.entries[owner.0].members.insert(name.into(), id);
    }

    /// Bind `name` on `owner` unless it is already bound. Returns whether it was added.
    pub fn add_member_if_absent(&mut self, owner: SymbolId, name: &str, id: SymbolId) -> bool {
        let members = &mut self.entries[owner.0].members;
        if members.contains_key(name) {
            return false;
        }
        members.insert(name.to_string(), id);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read an index written by [`SymbolIndex::save`]. Every id it holds must
    /// name an entry.
    pub fn load(path: &Path) -> Result<Self, SymbolError> {
        let content = std::fs::read_to_string(path)?;
        let index: Self = serde_json::from_str(&content)?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> Result<(), SymbolError> {
        if self.entries.is_empty() {
            return Err(SymbolError::InvalidIndex("missing package entry".to_string()));
        }
        for entry in &self.entries {
            let dangling = entry
                .bases
                .iter()
                .chain(entry.members.values())
                .find(|id| id.0 >= self.entries.len());
            if let Some(id) = dangling {
                return Err(SymbolError::InvalidIndex(format!(
                    "{} refers to missing entry {}",
                    entry.qualname, id.0
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), SymbolError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl SymbolTable for SymbolIndex {
    fn package_name(&self) -> &str {
        &self.package_name
    }

    fn root(&self) -> SymbolId {
        SymbolId(0)
    }

    fn entry(&self, id: SymbolId) -> &SymbolEntry {
        &self.entries[id.0]
    }

    fn get_attr(&self, owner: SymbolId, name: &str) -> Option<SymbolId> {
        let entry = self.entries.get(owner.0)?;
        if entry.kind != SymbolKind::Class {
            return entry.members.get(name).copied();
        }
        self.mro(owner)
            .into_iter()
            .find_map(|class| self.entries[class.0].members.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(index: &mut SymbolIndex, name: &str, bases: Vec<SymbolId>) -> SymbolId {
        let mut entry = SymbolEntry::new(name, SymbolKind::Class, "pkg");
        entry.qualname = name.to_string();
        entry.bases = bases;
        let id = index.push(entry);
        index.set_member(SymbolId(0), name, id);
        id
    }

    fn method(index: &mut SymbolIndex, owner: SymbolId, name: &str, doc: &str) -> SymbolId {
        let mut entry = SymbolEntry::new(name, SymbolKind::Method, "pkg");
        entry.qualname = format!("{}.{}", index.entry(owner).name, name);
        entry.docstring = Some(doc.to_string());
        entry.params = vec![Parameter::new("self"), Parameter::new("x")];
        let id = index.push(entry);
        index.set_member(owner, name, id);
        id
    }

    #[test]
    fn test_resolve_with_and_without_package() {
        let mut index = SymbolIndex::new("pkg");
        let foo = class(&mut index, "Foo", vec![]);
        let bar = method(&mut index, foo, "bar", "Bar.");

        assert_eq!(index.resolve("pkg"), Some(SymbolId(0)));
        assert_eq!(index.resolve("Foo"), Some(foo));
        assert_eq!(index.resolve("pkg.Foo"), Some(foo));
        assert_eq!(index.resolve("pkg.Foo.bar"), Some(bar));
        assert_eq!(index.resolve("pkg.Missing"), None);
        assert_eq!(index.resolve("pkg.Foo.bar.baz"), None);
        assert_eq!(index.resolve(""), None);
    }

    #[test]
    fn test_c3_mro_and_inherited_attributes() {
        let mut index = SymbolIndex::new("pkg");
        let base = class(&mut index, "Base", vec![]);
        let left = class(&mut index, "Left", vec![base]);
        let right = class(&mut index, "Right", vec![base]);
        let child = class(&mut index, "Child", vec![left, right]);
        let from_right = method(&mut index, right, "run", "Right run.");
        method(&mut index, base, "run", "Base run.");
        method(&mut index, base, "stop", "Stop.");

        assert_eq!(index.mro(child), vec![child, left, right, base]);
        assert_eq!(index.get_attr(child, "run"), Some(from_right));
        assert_eq!(index.attributes(child), vec!["run".to_string(), "stop".to_string()]);
    }

    #[test]
    fn test_inconsistent_hierarchy_falls_back_to_depth_first() {
        let mut index = SymbolIndex::new("pkg");
        let a = class(&mut index, "A", vec![]);
        let b = class(&mut index, "B", vec![a]);
        let bad = class(&mut index, "Bad", vec![a, b]);
        assert_eq!(index.mro(bad), vec![bad, a, b]);
    }

    #[test]
    fn test_signature_skips_self_and_uses_init() {
        let mut index = SymbolIndex::new("pkg");
        let foo = class(&mut index, "Foo", vec![]);
        method(&mut index, foo, "__init__", "");
        let bar = method(&mut index, foo, "bar", "Bar.");

        let names: Vec<String> = index.signature(foo).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["x"]);
        let names: Vec<String> = index.signature(bar).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["x"]);
        assert!(index.signature(SymbolId(0)).is_empty());
    }

    #[test]
    fn test_clean_docstring() {
        let raw = "Summary line.\n\n        Details here.\n            Indented more.\n        ";
        assert_eq!(
            clean_docstring(raw),
            "Summary line.\n\nDetails here.\n    Indented more."
        );
        assert_eq!(clean_docstring("\n    Starts on second line.\n    "), "Starts on second line.");
        assert_eq!(clean_docstring("   "), "");
    }

    #[test]
    fn test_clean_docstring_multibyte_indent() {
        assert_eq!(clean_docstring("S\n  x\n\u{3000}y"), "S\n x\ny");
        assert_eq!(clean_docstring("S\n\u{3000}\u{3000}x\n\u{3000}\u{3000}y"), "S\nx\ny");
    }

    #[test]
    fn test_docstring_and_location() {
        let mut index = SymbolIndex::new("pkg");
        let foo = class(&mut index, "Foo", vec![]);
        let bar = method(&mut index, foo, "bar", "\n    Bar does things.\n    ");
        index.entry_mut(bar).file = "pkg/foo.py".to_string();
        index.entry_mut(bar).line = 12;

        assert_eq!(index.docstring(bar).as_deref(), Some("Bar does things."));
        assert_eq!(index.raw_docstring(bar), Some("\n    Bar does things.\n    "));
        assert_eq!(index.docstring(foo), None);
        let location = index.source_location(bar).unwrap();
        assert_eq!(location.file, "pkg/foo.py");
        assert_eq!(location.line, 12);
        assert_eq!(location.module, "pkg");
        assert!(index.source_location(foo).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.json");
        let mut index = SymbolIndex::new("pkg");
        let foo = class(&mut index, "Foo", vec![]);
        method(&mut index, foo, "bar", "Bar.");

        index.save(&path).unwrap();
        let loaded = SymbolIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.resolve("pkg.Foo.bar"), index.resolve("pkg.Foo.bar"));
    }

    #[test]
    fn test_load_rejects_dangling_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.json");
        let mut index = SymbolIndex::new("pkg");
        let foo = class(&mut index, "Foo", vec![]);
        index.set_member(foo, "ghost", SymbolId(99));
        index.save(&path).unwrap();
        assert!(matches!(SymbolIndex::load(&path), Err(SymbolError::InvalidIndex(_))));

        let empty = SymbolIndex {
            package_name: "pkg".to_string(),
            entries: Vec::new(),
        };
        empty.save(&path).unwrap();
        assert!(matches!(SymbolIndex::load(&path), Err(SymbolError::InvalidIndex(_))));
    }
}
