//! Convert command - turn one .rst/.md file into MDX.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::site::{convert_page, read_source};
use crate::types::PageInfo;

#[derive(Args)]
pub struct ConvertCmd {
    /// Source file
    pub file: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Package name used in links
    #[arg(long, default_value = "")]
    pub package_name: String,
}

impl ConvertCmd {
    pub async fn run(&self) -> Result<()> {
        let source = read_source(&self.file).with_context(|| format!("Failed to read {}", self.file.display()))?;
        let extension = self.file.extension().and_then(|e| e.to_str()).unwrap_or("md");
        let stem = self.file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let page_info = PageInfo::new(&self.package_name).for_page(format!("{}.html", stem), self.file.clone());

        let converted = convert_page(&source, extension, &page_info)
            .with_context(|| format!("Failed to convert {}", self.file.display()))?;

        match &self.output {
            Some(path) => std::fs::write(path, converted)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => print!("{}", converted),
        }
        Ok(())
    }
}
