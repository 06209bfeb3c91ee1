//! Retrieval chunks and their embedding.

mod chunker;
mod local;
mod pipeline;
mod record;
mod service;

pub use local::{HashingEmbedder, JsonlStore};
pub use pipeline::{create_chunks, embed_chunks, upload_records};
