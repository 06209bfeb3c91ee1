//! Build command - convert a documentation folder into linked MDX pages.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use super::{ConfigArgs, SymbolArgs};
use crate::site::build_site;
use crate::types::{summarize_errors, PageInfo};

#[derive(Args)]
pub struct BuildCmd {
    /// Folder with the .md/.mdx/.rst sources
    pub doc_folder: PathBuf,

    /// Output folder for the .mdx pages
    #[arg(short, long)]
    pub build_dir: PathBuf,

    #[command(flatten)]
    pub symbols: SymbolArgs,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl BuildCmd {
    pub async fn run(&self) -> Result<()> {
        let config = self.config.load(&self.doc_folder, &self.symbols)?;
        let table = self.symbols.load()?;
        let page_info = PageInfo::from_config(&config);

        println!("Building {} docs from {}...", config.package_name, self.doc_folder.display());
        let report = build_site(&self.doc_folder, &self.build_dir, &table, &page_info)?;

        for warning in &report.warnings {
            eprintln!("warning: {}", warning);
        }
        println!(
            "Wrote {} pages ({} anchors) to {}",
            report.pages.len(),
            report.anchors,
            self.build_dir.display()
        );
        if !report.is_ok() {
            bail!(summarize_errors(&report.errors));
        }
        Ok(())
    }
}
