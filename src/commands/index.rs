//! Index command - extract the symbol table of a Python package.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::symbols::PythonExtractor;

#[derive(Args)]
pub struct IndexCmd {
    /// Package directory (its name is the package name)
    pub package_dir: PathBuf,

    /// Where to write the index
    #[arg(short, long, default_value = "symbols.json")]
    pub output: PathBuf,
}

impl IndexCmd {
    pub async fn run(&self) -> Result<()> {
        let index = PythonExtractor::extract_dir(&self.package_dir)
            .with_context(|| format!("Failed to index {}", self.package_dir.display()))?;
        index
            .save(&self.output)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;

        println!("Indexed {} symbols into {}", index.len(), self.output.display());
        Ok(())
    }
}
