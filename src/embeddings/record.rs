use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Chunk;

const MAX_ID_LEN: usize = 500;
const HASH_PREFIX_LEN: usize = 32;

/// A chunk with its vector, as stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub text: String,
    /// `page#fragment` of the chunk.
    pub locator: String,
    pub page_title: String,
    pub library: String,
    pub vector: Vec<f32>,
    pub heading1: Option<String>,
    pub heading2: Option<String>,
    pub heading3: Option<String>,
    pub heading4: Option<String>,
    pub heading5: Option<String>,
}

impl EmbeddingRecord {
    pub fn new(id: String, chunk: &Chunk, vector: Vec<f32>) -> Self {
        let [heading1, heading2, heading3, heading4, heading5] =
            chunk.heading_levels().map(|h| h.map(|h| h.trim_start_matches('#').trim().to_string()));
        Self {
            id,
            text: chunk.text.clone(),
            locator: chunk.source.clone(),
            page_title: chunk.page_title.clone(),
            library: chunk.library.clone(),
            vector,
            heading1,
            heading2,
            heading3,
            heading4,
            heading5,
        }
    }
}

/// Text sent to the embedding service for a chunk.
pub fn embedding_input(chunk: &Chunk) -> String {
    format!(
        "Documentation of library \"{}\" under section: {}\n\n{}",
        chunk.library,
        chunk.headings.join(" > "),
        chunk.text
    )
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Base id of a chunk: `{library}-{page}-{fragment}`, identifier-safe.
pub fn document_id(library: &str, page: &str, fragment: Option<&str>) -> String {
    let raw = match fragment {
        Some(fragment) if !fragment.is_empty() => format!("{}-{}-{}", library, page, fragment),
        _ => format!("{}-{}", library, page),
    };
    sanitize(&raw)
}

/// One unique id per chunk, in chunk order.
///
/// Repeated locators get `-1`, `-2`... suffixes; overlong ids are replaced
/// by a digest.
pub fn document_ids(chunks: &[Chunk]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    chunks
        .iter()
        .map(|chunk| {
            let base = document_id(&chunk.library, chunk.page(), chunk.fragment());
            let count = seen.entry(base.clone()).or_insert(0);
            let id = match *count {
                0 => base,
                n => format!("{}-{}", base, n),
            };
            *count += 1;
            if id.len() > MAX_ID_LEN {
                let digest = hex::encode(Sha256::digest(id.as_bytes()));
                format!("{}-{}", sanitize(&chunk.library), &digest[..HASH_PREFIX_LEN])
            } else {
                id
            }
        })
        .collect()
}
