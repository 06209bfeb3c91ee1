//! Strip-html command - turn built MDX pages back into plain Markdown.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::markup::html_strip::strip_html;

#[derive(Args)]
pub struct StripHtmlCmd {
    /// An .mdx file or a folder of them
    pub path: PathBuf,

    /// Output file, or output folder when `path` is a folder (default: stdout for a file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl StripHtmlCmd {
    pub async fn run(&self) -> Result<()> {
        if self.path.is_dir() {
            let Some(output) = &self.output else {
                bail!("--output is required when stripping a folder");
            };
            let count = strip_folder(&self.path, output)?;
            println!("Stripped {} pages into {}", count, output.display());
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let stripped = strip_html(&content);
        match &self.output {
            Some(path) => std::fs::write(path, stripped)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => print!("{}", stripped),
        }
        Ok(())
    }
}

/// Strip every `.mdx` page under `folder` into a mirrored `.md` tree.
fn strip_folder(folder: &Path, output: &Path) -> Result<usize> {
    let pattern = format!("{}/**/*.mdx", folder.display());
    let mut count = 0;
    for path in glob::glob(&pattern)?.flatten() {
        let relative = path.strip_prefix(folder).unwrap_or(&path);
        let destination = output.join(relative).with_extension("md");
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        std::fs::write(&destination, strip_html(&content))
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        count += 1;
    }
    Ok(count)
}
