//! Two-pass documentation build.
//!
//! Pass one converts every page and expands its autodoc directives, collecting
//! anchors. Once every page is done the anchor table is frozen and pass two
//! rewrites cross-references and adds frontmatter.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::anchors::{AnchorMap, AnchorTable};
use super::frontmatter::generate_frontmatter;
use super::xref::resolve_links_in_text;
use crate::autodoc::{resolve_autodoc, ObjectAnchor};
use crate::markup::{convert_md_to_mdx, convert_rst_to_mdx};
use crate::symbols::SymbolTable;
use crate::types::{DocError, PageError, PageInfo};

const SOURCE_EXTENSIONS: &[&str] = &["md", "mdx", "rst"];

/// Outcome of a site build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Written pages, relative to the build directory.
    pub pages: Vec<PathBuf>,
    pub anchors: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<PageError>,
}

impl BuildReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A documentation source file.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub path: PathBuf,
    /// Path relative to the doc folder.
    pub relative: PathBuf,
    /// Relative path without extension, `/`-separated (`model_doc/bert`).
    pub name: String,
}

impl SourcePage {
    fn new(doc_folder: &Path, path: PathBuf) -> Self {
        let relative = path.strip_prefix(doc_folder).unwrap_or(&path).to_path_buf();
        let name = relative
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            path,
            relative,
            name,
        }
    }

    fn extension(&self) -> &str {
        self.path.extension().and_then(|e| e.to_str()).unwrap_or("")
    }

    /// Per-page context for conversion.
    pub fn page_info(&self, base: &PageInfo) -> PageInfo {
        base.for_page(format!("{}.html", self.name), self.path.clone())
    }
}

/// Every `.md`, `.mdx` and `.rst` file under `doc_folder`, sorted.
pub fn collect_pages(doc_folder: &Path) -> Result<Vec<SourcePage>, DocError> {
    let mut pages = Vec::new();
    for extension in SOURCE_EXTENSIONS {
        let pattern = format!("{}/**/*.{}", doc_folder.display(), extension);
        let paths = glob::glob(&pattern)
            .map_err(|e| DocError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        for path in paths.flatten() {
            if path.is_file() {
                pages.push(SourcePage::new(doc_folder, path));
            }
        }
    }
    pages.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(pages)
}

/// Read a source file, dropping a byte-order mark.
pub fn read_source(path: &Path) -> Result<String, DocError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Convert one page to MDX according to its extension.
pub fn convert_page(text: &str, extension: &str, page_info: &PageInfo) -> Result<String, DocError> {
    match extension {
        "rst" => convert_rst_to_mdx(text, page_info),
        _ => convert_md_to_mdx(text, page_info),
    }
}

struct FirstPass {
    page: SourcePage,
    text: Option<String>,
    anchors: Vec<ObjectAnchor>,
    warnings: Vec<String>,
    errors: Vec<PageError>,
}

fn first_pass(page: SourcePage, table: &dyn SymbolTable, base: &PageInfo) -> FirstPass {
    let page_info = page.page_info(base);
    let converted = read_source(&page.path).and_then(|text| convert_page(&text, page.extension(), &page_info));
    let text = match converted {
        Ok(text) => text,
        Err(e) => {
            let error = PageError::new(page.path.clone(), e.to_string());
            return FirstPass {
                page,
                text: None,
                anchors: Vec::new(),
                warnings: Vec::new(),
                errors: vec![error],
            };
        }
    };

    let resolved = resolve_autodoc(&text, table, &page_info);
    debug!(
        page = %page.name,
        anchors = resolved.anchors.len(),
        errors = resolved.errors.len(),
        "converted page"
    );
    FirstPass {
        page,
        text: Some(resolved.text),
        anchors: resolved.anchors,
        warnings: resolved.warnings,
        errors: resolved.errors,
    }
}

fn second_pass(
    page: &SourcePage,
    text: &str,
    table: &dyn SymbolTable,
    anchors: &AnchorMap,
    base: &PageInfo,
    build_dir: &Path,
) -> Result<PathBuf, PageError> {
    let page_info = page.page_info(base);
    let to_page_error = |e: DocError| PageError::new(page.path.clone(), e.to_string());

    let text = resolve_links_in_text(text, table, anchors, &page_info);
    let text = generate_frontmatter(&text).map_err(to_page_error)?;

    let relative = page.relative.with_extension("mdx");
    let destination = build_dir.join(&relative);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| to_page_error(e.into()))?;
    }
    std::fs::write(&destination, text).map_err(|e| to_page_error(e.into()))?;
    Ok(relative)
}

/// Build every page of `doc_folder` into `build_dir`.
///
/// Per-page failures are collected in the report; only a failure to list the
/// doc folder or create the build directory is returned as an error.
pub fn build_site(
    doc_folder: &Path,
    build_dir: &Path,
    table: &dyn SymbolTable,
    page_info: &PageInfo,
) -> Result<BuildReport, DocError> {
    let pages = collect_pages(doc_folder)?;
    std::fs::create_dir_all(build_dir)?;
    info!(pages = pages.len(), doc_folder = %doc_folder.display(), "building documentation");

    let first: Vec<FirstPass> = pages
        .into_par_iter()
        .map(|page| first_pass(page, table, page_info))
        .collect();

    let mut report = BuildReport::default();
    let mut table_acc = AnchorTable::new();
    let mut converted = Vec::new();
    for outcome in first {
        table_acc.extend_page(&outcome.page.name, &outcome.anchors);
        report.warnings.extend(outcome.warnings);
        report.errors.extend(outcome.errors);
        if let Some(text) = outcome.text {
            converted.push((outcome.page, text));
        }
    }
    let anchors = table_acc.freeze();
    report.anchors = anchors.len();
    info!(anchors = anchors.len(), "collected anchors");

    let second: Vec<Result<PathBuf, PageError>> = converted
        .par_iter()
        .map(|(page, text)| second_pass(page, text, table, &anchors, page_info, build_dir))
        .collect();
    for outcome in second {
        match outcome {
            Ok(path) => report.pages.push(path),
            Err(e) => report.errors.push(e),
        }
    }

    for warning in &report.warnings {
        warn!(warning = %warning, "documentation warning");
    }
    info!(
        pages = report.pages.len(),
        errors = report.errors.len(),
        "documentation build finished"
    );
    Ok(report)
}
