use std::path::PathBuf;

use crate::config::DocConfig;

/// Context a page is converted in.
///
/// Carries everything the converters need to build absolute links:
/// package, version and language select the docs tree, the repository
/// fields build source links, and `page`/`path` locate the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub package_name: String,
    pub version: String,
    pub language: String,
    pub version_tag: String,
    pub version_tag_suffix: String,
    pub repo_owner: String,
    pub repo_name: String,

    /// Page path relative to the doc folder, with an `.html` suffix (e.g. `model_doc/bert.html`).
    pub page: Option<String>,

    /// Source file on disk, used to resolve relative includes.
    pub path: Option<PathBuf>,
}

impl PageInfo {
    pub fn new(package_name: impl Into<String>) -> Self {
        let package_name = package_name.into();
        Self {
            repo_name: package_name.clone(),
            package_name,
            version: "main".to_string(),
            language: "en".to_string(),
            version_tag: "main".to_string(),
            version_tag_suffix: "src/".to_string(),
            repo_owner: "huggingface".to_string(),
            page: None,
            path: None,
        }
    }

    pub fn from_config(config: &DocConfig) -> Self {
        Self {
            package_name: config.package_name.clone(),
            version: config.version.clone(),
            language: config.language.clone(),
            version_tag: config.version_tag.clone(),
            version_tag_suffix: config.version_tag_suffix.clone(),
            repo_owner: config.repo_owner.clone(),
            repo_name: config.repo_name(),
            page: None,
            path: None,
        }
    }

    /// Same context, pointed at one page.
    pub fn for_page(&self, page: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            page: Some(page.into()),
            path: Some(path.into()),
            ..self.clone()
        }
    }

    /// `/docs/{package}/{version}/{language}`
    pub fn docs_base(&self) -> String {
        format!(
            "/docs/{}/{}/{}",
            self.package_name, self.version, self.language
        )
    }

    /// Base URL for links into the package sources at the configured tag.
    pub fn source_base(&self) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}",
            self.repo_owner, self.repo_name, self.version_tag, self.version_tag_suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let info = PageInfo::new("transformers");
        assert_eq!(info.docs_base(), "/docs/transformers/main/en");
        assert_eq!(
            info.source_base(),
            "https://github.com/huggingface/transformers/blob/main/src/"
        );
        assert!(info.page.is_none());
    }

    #[test]
    fn test_for_page_keeps_context() {
        let mut info = PageInfo::new("datasets");
        info.version = "v2.0.0".to_string();
        let page = info.for_page("loading.html", "docs/loading.md");
        assert_eq!(page.page.as_deref(), Some("loading.html"));
        assert_eq!(page.version, "v2.0.0");
        assert_eq!(page.docs_base(), "/docs/datasets/v2.0.0/en");
    }
}
