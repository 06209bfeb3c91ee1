//! Chunks command - cut a documentation folder into retrieval chunks and
//! optionally embed them into a local JSON-lines index.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use super::{ConfigArgs, SymbolArgs};
use crate::embeddings::{create_chunks, embed_chunks, upload_records, HashingEmbedder, JsonlStore};
use crate::types::{summarize_errors, PageInfo};

#[derive(Args)]
pub struct ChunksCmd {
    /// Folder with the .md/.mdx/.rst sources
    pub doc_folder: PathBuf,

    /// JSON lines output, one chunk per line
    #[arg(short, long, default_value = "chunks.jsonl")]
    pub output: PathBuf,

    /// Character budget per chunk (overrides the config)
    #[arg(long)]
    pub chunk_len: Option<usize>,

    /// Embed the chunks and store the records under this directory
    #[arg(long)]
    pub index_dir: Option<PathBuf>,

    /// Name of the live index inside --index-dir
    #[arg(long, default_value = "docs", requires = "index_dir")]
    pub index_name: String,

    #[command(flatten)]
    pub symbols: SymbolArgs,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl ChunksCmd {
    pub async fn run(&self) -> Result<()> {
        let config = self.config.load(&self.doc_folder, &self.symbols)?;
        let table = self.symbols.load()?;
        let page_info = PageInfo::from_config(&config);
        let chunk_len = self.chunk_len.unwrap_or(config.chunking.chunk_len_chars);

        let set = create_chunks(&self.doc_folder, &table, &page_info, chunk_len)?;
        for warning in &set.warnings {
            eprintln!("warning: {}", warning);
        }
        if !set.is_ok() {
            bail!(summarize_errors(&set.errors));
        }

        let file = std::fs::File::create(&self.output)
            .with_context(|| format!("Failed to create {}", self.output.display()))?;
        let mut writer = BufWriter::new(file);
        for chunk in &set.chunks {
            serde_json::to_writer(&mut writer, chunk)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        println!("Wrote {} chunks to {}", set.chunks.len(), self.output.display());

        if let Some(index_dir) = &self.index_dir {
            let embedder = HashingEmbedder::new(config.embeddings.dimensions);
            let records = embed_chunks(&embedder, &set.chunks, &config.embeddings).await?;
            let store = JsonlStore::new(index_dir);
            let temp_index = format!("{}-tmp", self.index_name);
            let summary =
                upload_records(&store, &records, &self.index_name, &temp_index, &config.embeddings).await?;
            println!(
                "Indexed {} records in {} batches at {}",
                summary.records,
                summary.batches,
                store.index_path(&self.index_name).display()
            );
        }
        Ok(())
    }
}
