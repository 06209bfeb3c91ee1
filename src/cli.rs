//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{BuildCmd, CheckLinksCmd, ChunksCmd, ConvertCmd, IndexCmd, StripHtmlCmd};

#[derive(Parser)]
#[command(name = "docweave")]
#[command(about = "Turn package docs and docstrings into linked MDX pages and retrieval chunks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the symbol index of a Python package
    Index(IndexCmd),

    /// Build a documentation folder into linked MDX pages
    Build(BuildCmd),

    /// Convert a single .rst/.md file to MDX
    Convert(ConvertCmd),

    /// Cut a documentation folder into retrieval chunks (JSON lines)
    Chunks(ChunksCmd),

    /// Check relative links in a folder of Markdown pages
    CheckLinks(CheckLinksCmd),

    /// Strip site markup from built MDX pages
    StripHtml(StripHtmlCmd),
}

impl Commands {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Index(cmd) => cmd.run().await,
            Commands::Build(cmd) => cmd.run().await,
            Commands::Convert(cmd) => cmd.run().await,
            Commands::Chunks(cmd) => cmd.run().await,
            Commands::CheckLinks(cmd) => cmd.run().await,
            Commands::StripHtml(cmd) => cmd.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from([
            "docweave",
            "build",
            "docs/source",
            "--build-dir",
            "build",
            "--symbols",
            "symbols.json",
            "--version",
            "v1.0",
        ])
        .unwrap();
        let Commands::Build(cmd) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(cmd.build_dir.to_str(), Some("build"));
        assert_eq!(cmd.config.version.as_deref(), Some("v1.0"));
    }

    #[test]
    fn test_parse_chunks_index() {
        let cli = Cli::try_parse_from([
            "docweave",
            "chunks",
            "docs",
            "--symbols",
            "s.json",
            "--index-dir",
            "out/index",
        ])
        .unwrap();
        let Commands::Chunks(cmd) = cli.command else {
            panic!("expected chunks");
        };
        assert_eq!(cmd.index_dir.as_deref().and_then(|p| p.to_str()), Some("out/index"));
        assert_eq!(cmd.index_name, "docs");

        let result = Cli::try_parse_from(["docweave", "chunks", "docs", "--symbols", "s.json", "--index-name", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_symbol_sources_conflict() {
        let result = Cli::try_parse_from([
            "docweave",
            "chunks",
            "docs",
            "--symbols",
            "s.json",
            "--package-dir",
            "src/pkg",
        ]);
        assert!(result.is_err());
    }
}
