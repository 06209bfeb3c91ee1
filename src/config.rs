//! Documentation build configuration.
//!
//! Config is read from `_config.toml` at the root of the doc folder and contains:
//! - the package being documented and the docs version/language
//! - repository coordinates used for source links
//! - chunking and embedding settings for the retrieval pipeline

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "_config.toml";

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocConfig {
    /// Name of the documented package (also its import name).
    #[serde(default)]
    pub package_name: String,

    /// Docs version segment in generated links (default: main).
    #[serde(default = "default_version")]
    pub version: String,

    /// Docs language segment in generated links (default: en).
    #[serde(default = "default_language")]
    pub language: String,

    /// Git ref source links point at (default: main).
    #[serde(default = "default_version")]
    pub version_tag: String,

    /// Path from the repository root to the package sources (default: src/).
    #[serde(default = "default_version_tag_suffix")]
    pub version_tag_suffix: String,

    /// GitHub owner of the repository (default: huggingface).
    #[serde(default = "default_repo_owner")]
    pub repo_owner: String,

    /// GitHub repository name, when it differs from the package name.
    #[serde(default)]
    pub repo_name: Option<String>,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Character budget per chunk (default: 2000).
    #[serde(default = "default_chunk_len_chars")]
    pub chunk_len_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Texts per embedding request (default: 20).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Embedding requests in flight at once (default: 16).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records per document-store write (default: 5000).
    #[serde(default = "default_upload_batch_size")]
    pub upload_batch_size: usize,

    /// Attempts per service call before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts, scaled by the attempt number (default: 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Vector width of the local hashing embedder (default: 256).
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_version() -> String {
    "main".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_version_tag_suffix() -> String {
    "src/".to_string()
}

fn default_repo_owner() -> String {
    "huggingface".to_string()
}

fn default_chunk_len_chars() -> usize {
    2000
}

fn default_batch_size() -> usize {
    20
}

fn default_concurrency() -> usize {
    16
}

fn default_upload_batch_size() -> usize {
    5000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_dimensions() -> usize {
    256
}

impl Default for DocConfig {
    fn default() -> Self {
        Self {
            package_name: String::new(),
            version: default_version(),
            language: default_language(),
            version_tag: default_version(),
            version_tag_suffix: default_version_tag_suffix(),
            repo_owner: default_repo_owner(),
            repo_name: None,
            chunking: ChunkingConfig::default(),
            embeddings: EmbeddingConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_len_chars: default_chunk_len_chars(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            upload_batch_size: default_upload_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            dimensions: default_dimensions(),
        }
    }
}

impl DocConfig {
    /// Load config from `_config.toml` in `doc_folder`, falling back to defaults.
    pub fn load(doc_folder: &Path) -> Result<Self> {
        Self::load_from(&Self::config_path(doc_folder))
    }

    /// Load config from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Get the config file path for a doc folder.
    pub fn config_path(doc_folder: &Path) -> PathBuf {
        doc_folder.join(CONFIG_FILE)
    }

    /// Repository name, defaulting to the package name.
    pub fn repo_name(&self) -> String {
        self.repo_name
            .clone()
            .unwrap_or_else(|| self.package_name.clone())
    }

    /// Apply command-line overrides on top of file values.
    pub fn with_overrides(
        mut self,
        package_name: Option<&str>,
        version: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        if let Some(name) = package_name {
            self.package_name = name.to_string();
        }
        if let Some(version) = version {
            self.version = version.to_string();
        }
        if let Some(language) = language {
            self.language = language.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DocConfig::default();
        assert_eq!(config.version, "main");
        assert_eq!(config.language, "en");
        assert_eq!(config.version_tag_suffix, "src/");
        assert_eq!(config.repo_owner, "huggingface");
        assert_eq!(config.chunking.chunk_len_chars, 2000);
        assert_eq!(config.embeddings.batch_size, 20);
        assert_eq!(config.embeddings.concurrency, 16);
        assert_eq!(config.embeddings.dimensions, 256);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DocConfig::load(dir.path()).unwrap();
        assert!(config.package_name.is_empty());
        assert_eq!(config.version, "main");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
package_name = "datasets"
version = "v2.1.0"

[chunking]
chunk_len_chars = 500
"#,
        )
        .unwrap();

        let config = DocConfig::load(dir.path()).unwrap();
        assert_eq!(config.package_name, "datasets");
        assert_eq!(config.version, "v2.1.0");
        assert_eq!(config.language, "en");
        assert_eq!(config.chunking.chunk_len_chars, 500);
        assert_eq!(config.embeddings.max_attempts, 5);
        assert_eq!(config.repo_name(), "datasets");
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "package_name = [").unwrap();
        assert!(DocConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = DocConfig::default().with_overrides(Some("pkg"), None, Some("fr"));
        assert_eq!(config.package_name, "pkg");
        assert_eq!(config.version, "main");
        assert_eq!(config.language, "fr");
    }
}
