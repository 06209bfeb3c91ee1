//! Check-links command - find broken relative links.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use crate::site::check_links;

#[derive(Args)]
pub struct CheckLinksCmd {
    /// Folder of .md/.mdx files
    pub folder: PathBuf,
}

impl CheckLinksCmd {
    pub async fn run(&self) -> Result<()> {
        let report = check_links(&self.folder)?;
        for warning in &report.warnings {
            eprintln!("warning: {}", warning);
        }
        if !report.is_ok() {
            bail!(report.summary());
        }
        println!("{}", report.summary());
        Ok(())
    }
}
