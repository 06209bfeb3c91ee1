//! Relative link checking across a documentation folder.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{info, warn};

use crate::types::DocError;

static MD_LINK: OnceLock<Regex> = OnceLock::new();

fn md_link_re() -> &'static Regex {
    MD_LINK.get_or_init(|| Regex::new(r"!?\[([^\]]*)\]\(([^)]+)\)").expect("link regex should compile"))
}

const EXTERNAL_SCHEMES: &[&str] = &["http://", "https://", "mailto:", "ftp://", "tel:", "//"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub broken: Vec<BrokenLink>,
    /// Files that could not be read.
    pub warnings: Vec<String>,
    pub files_checked: usize,
    pub links_checked: usize,
}

impl LinkReport {
    pub fn is_ok(&self) -> bool {
        self.broken.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_ok() {
            return format!(
                "All links valid! Checked {} links in {} files.",
                self.links_checked, self.files_checked
            );
        }
        let mut out = format!(
            "Found {} broken link(s) in {} files:\n",
            self.broken.len(),
            self.files_checked
        );
        for link in &self.broken {
            out.push_str(&format!("\n  {}:{}\n    Link text: [{}]\n    Link URL: {}\n", link.file.display(), link.line, link.text, link.url));
        }
        out
    }
}

pub fn is_external_link(url: &str) -> bool {
    EXTERNAL_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Local file a link points at, when it exists.
///
/// Extensionless and `.html` targets also match `.md`/`.mdx` files.
pub fn find_target(source_dir: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    if path.is_empty() {
        return Some(source_dir.to_path_buf());
    }
    let target = source_dir.join(path);
    if target.exists() {
        return Some(target);
    }
    let extension = target.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension.is_empty() || extension == "html" {
        for candidate in ["md", "mdx"] {
            let with_extension = target.with_extension(candidate);
            if with_extension.exists() {
                return Some(with_extension);
            }
        }
        let directory = target.with_extension("");
        for candidate in ["index.md", "index.mdx", "README.md"] {
            let page = directory.join(candidate);
            if page.exists() {
                return Some(page);
            }
        }
    }
    None
}

fn check_file(file: &Path) -> Result<(Vec<BrokenLink>, usize), String> {
    let content = std::fs::read_to_string(file).map_err(|e| format!("Could not read {}: {}", file.display(), e))?;
    let source_dir = file.parent().unwrap_or(Path::new(""));
    let mut broken = Vec::new();
    let mut checked = 0;

    for (idx, line) in content.trim_start_matches('\u{feff}').lines().enumerate() {
        for caps in md_link_re().captures_iter(line) {
            let url = caps[2].trim();
            if is_external_link(url) || url.starts_with('#') {
                continue;
            }
            checked += 1;
            if find_target(source_dir, url).is_none() {
                broken.push(BrokenLink {
                    file: file.to_path_buf(),
                    line: idx + 1,
                    text: caps[1].to_string(),
                    url: url.to_string(),
                });
            }
        }
    }
    Ok((broken, checked))
}

/// Check every relative link in the `.md`/`.mdx` files under `folder`.
pub fn check_links(folder: &Path) -> Result<LinkReport, DocError> {
    let mut files = Vec::new();
    for extension in ["md", "mdx"] {
        let pattern = format!("{}/**/*.{}", folder.display(), extension);
        let paths = glob::glob(&pattern)
            .map_err(|e| DocError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        files.extend(paths.flatten().filter(|p| p.is_file()));
    }
    files.sort();

    let results: Vec<Result<(Vec<BrokenLink>, usize), String>> = files.par_iter().map(|file| check_file(file)).collect();

    let mut report = LinkReport {
        files_checked: files.len(),
        ..Default::default()
    };
    for result in results {
        match result {
            Ok((broken, checked)) => {
                report.links_checked += checked;
                report.broken.extend(broken);
            }
            Err(message) => {
                warn!(error = %message, "skipping unreadable file");
                report.warnings.push(message);
            }
        }
    }
    info!(
        files = report.files_checked,
        links = report.links_checked,
        broken = report.broken.len(),
        "checked links"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_external_link() {
        assert!(is_external_link("https://huggingface.co"));
        assert!(is_external_link("mailto:a@b.c"));
        assert!(is_external_link("//cdn.example.com/x.png"));
        assert!(!is_external_link("./quicktour"));
    }

    #[test]
    fn test_check_links() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("guides")).unwrap();
        std::fs::write(root.join("quicktour.md"), "# Quick tour").unwrap();
        std::fs::write(root.join("guides/training.mdx"), "# Training").unwrap();
        std::fs::write(root.join("logo.png"), "png").unwrap();
        std::fs::write(
            root.join("index.md"),
            "# Home\n\
             See [the tour](./quicktour) and [training](guides/training.html#setup).\n\
             ![logo](logo.png) [web](https://example.com) [top](#home)\n\
             [gone](./missing.md?x=1)\n",
        )
        .unwrap();
        std::fs::write(root.join("guides/back.md"), "[home](../index.md)\n[nope](../nope)\n").unwrap();

        let report = check_links(root).unwrap();
        assert_eq!(report.files_checked, 4);
        assert_eq!(report.links_checked, 6);
        assert!(!report.is_ok());

        let mut broken: Vec<(String, usize)> = report
            .broken
            .iter()
            .map(|b| (b.url.clone(), b.line))
            .collect();
        broken.sort();
        assert_eq!(
            broken,
            vec![("../nope".to_string(), 2), ("./missing.md?x=1".to_string(), 4)]
        );
        assert!(report.summary().starts_with("Found 2 broken link(s) in 4 files:"));
    }

    #[test]
    fn test_find_target_directory_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tasks")).unwrap();
        std::fs::write(dir.path().join("tasks/index.md"), "# Tasks").unwrap();
        assert_eq!(
            find_target(dir.path(), "tasks.html"),
            Some(dir.path().join("tasks").join("index.md"))
        );
        assert_eq!(find_target(dir.path(), "tasks"), Some(dir.path().join("tasks")));
        assert_eq!(find_target(dir.path(), "other.html"), None);
    }

    #[test]
    fn test_clean_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "[b](b)\n").unwrap();
        std::fs::write(dir.path().join("b.mdx"), "no links").unwrap();
        let report = check_links(dir.path()).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.summary(), "All links valid! Checked 1 links in 2 files.");
    }
}
