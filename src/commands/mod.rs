//! CLI command implementations.

mod build;
mod check_links;
mod chunks;
mod convert;
mod index;
mod strip;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::config::DocConfig;
use crate::symbols::{PythonExtractor, SymbolIndex};

pub use build::BuildCmd;
pub use check_links::CheckLinksCmd;
pub use chunks::ChunksCmd;
pub use convert::ConvertCmd;
pub use index::IndexCmd;
pub use strip::StripHtmlCmd;

/// Where the symbol table comes from.
#[derive(Args, Debug)]
pub struct SymbolArgs {
    /// Precomputed symbol index (from `docweave index`)
    #[arg(long, conflicts_with = "package_dir")]
    pub symbols: Option<PathBuf>,

    /// Package sources to index on the fly
    #[arg(long)]
    pub package_dir: Option<PathBuf>,
}

impl SymbolArgs {
    pub fn load(&self) -> Result<SymbolIndex> {
        match (&self.symbols, &self.package_dir) {
            (Some(path), _) => SymbolIndex::load(path)
                .with_context(|| format!("Failed to load symbol index {}", path.display())),
            (None, Some(dir)) => PythonExtractor::extract_dir(dir)
                .with_context(|| format!("Failed to index package {}", dir.display())),
            (None, None) => bail!("Pass either --symbols or --package-dir"),
        }
    }

    /// Package name implied by `--package-dir`.
    fn package_name(&self) -> Option<String> {
        self.package_dir
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Config file location and per-run overrides.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file (default: <doc_folder>/_config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Documented package name
    #[arg(long)]
    pub package_name: Option<String>,

    /// Docs version used in links
    #[arg(long)]
    pub version: Option<String>,

    /// Docs language used in links
    #[arg(long)]
    pub language: Option<String>,
}

impl ConfigArgs {
    pub fn load(&self, doc_folder: &Path, symbols: &SymbolArgs) -> Result<DocConfig> {
        let config = match &self.config {
            Some(path) => DocConfig::load_from(path)?,
            None => DocConfig::load(doc_folder)?,
        };
        let mut config = config.with_overrides(
            self.package_name.as_deref(),
            self.version.as_deref(),
            self.language.as_deref(),
        );
        if config.package_name.is_empty() {
            config.package_name = symbols
                .package_name()
                .context("No package name: set package_name in _config.toml or pass --package-name")?;
        }
        Ok(config)
    }
}
