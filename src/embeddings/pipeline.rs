//! Retrieval pipeline: pages to chunks, chunks to vectors, vectors to the index.

use std::path::Path;

use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{debug, info};

use super::chunker::{clean_md, extract_autodoc, PageChunker};
use super::record::{document_ids, embedding_input, EmbeddingRecord};
use super::service::{DocumentStore, EmbeddingService, RetryPolicy, ServiceError};
use crate::autodoc::{autodoc, ObjectAnchor};
use crate::config::EmbeddingConfig;
use crate::markup::html_strip::strip_html;
use crate::site::{collect_pages, convert_page, read_source, resolve_links_in_text, AnchorTable, SourcePage};
use crate::symbols::SymbolTable;
use crate::types::{Chunk, DocError, PageError, PageInfo};

/// Chunks of a documentation folder.
#[derive(Debug, Default)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
    pub anchors: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<PageError>,
}

impl ChunkSet {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct PageChunks {
    chunks: Vec<Chunk>,
    anchors: Vec<ObjectAnchor>,
    warnings: Vec<String>,
    errors: Vec<PageError>,
}

fn chunk_page(page: &SourcePage, table: &dyn SymbolTable, base: &PageInfo, chunk_len_chars: usize) -> PageChunks {
    let page_info = page.page_info(base);
    let extension = page.path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let converted = read_source(&page.path).and_then(|source| match extension {
        "rst" => convert_page(&source, extension, &page_info).map(|text| clean_md(&text)),
        _ => convert_page(&clean_md(&source), extension, &page_info),
    });
    let text = match converted {
        Ok(text) => text,
        Err(e) => {
            return PageChunks {
                errors: vec![PageError::new(page.path.clone(), e.to_string())],
                ..Default::default()
            };
        }
    };

    let chunker = PageChunker {
        page: &page.name,
        library: table.package_name(),
        chunk_len_chars,
    };
    let (prose, placed) = extract_autodoc(&text);
    let mut out = PageChunks::default();

    for entry in placed {
        let directive = &entry.directive;
        match autodoc(table, &directive.object, directive.methods.as_deref(), &page_info) {
            Ok(doc) => {
                for part in doc.parts {
                    let text = strip_html(&part.component).trim().to_string();
                    out.chunks.push(chunker.autodoc_chunk(text, &part.anchor, entry.headings.clone()));
                }
                out.anchors.extend(doc.anchors);
                out.warnings.extend(doc.warnings);
            }
            Err(e) => out
                .errors
                .push(PageError::new(page.path.clone(), e.to_string()).at_line(directive.line + 1)),
        }
    }
    out.chunks.extend(chunker.markdown_chunks(&prose));

    debug!(page = %page.name, chunks = out.chunks.len(), "chunked page");
    out
}

/// Chunk every page under `doc_folder`, then resolve cross-references in
/// the chunk texts once all anchors are known.
pub fn create_chunks(
    doc_folder: &Path,
    table: &dyn SymbolTable,
    page_info: &PageInfo,
    chunk_len_chars: usize,
) -> Result<ChunkSet, DocError> {
    let pages = collect_pages(doc_folder)?;
    info!(pages = pages.len(), doc_folder = %doc_folder.display(), "chunking documentation");

    let per_page: Vec<PageChunks> = pages
        .par_iter()
        .map(|page| chunk_page(page, table, page_info, chunk_len_chars))
        .collect();

    let mut set = ChunkSet::default();
    let mut anchors = AnchorTable::new();
    for (page, outcome) in pages.iter().zip(per_page) {
        anchors.extend_page(&page.name, &outcome.anchors);
        set.chunks.extend(outcome.chunks);
        set.warnings.extend(outcome.warnings);
        set.errors.extend(outcome.errors);
    }
    let anchors = anchors.freeze();
    set.anchors = anchors.len();

    set.chunks.par_iter_mut().for_each(|chunk| {
        chunk.text = resolve_links_in_text(&chunk.text, table, &anchors, page_info);
    });

    info!(
        chunks = set.chunks.len(),
        anchors = set.anchors,
        errors = set.errors.len(),
        "chunking finished"
    );
    Ok(set)
}

/// Embed every chunk, `batch_size` texts per request and `concurrency`
/// requests in flight. Records come back in chunk order.
pub async fn embed_chunks<S: EmbeddingService>(
    service: &S,
    chunks: &[Chunk],
    config: &EmbeddingConfig,
) -> Result<Vec<EmbeddingRecord>, ServiceError> {
    let policy = RetryPolicy::from_config(config);
    let batch_size = config.batch_size.max(1);
    let batches: Vec<(usize, Vec<String>)> = chunks
        .chunks(batch_size)
        .map(|batch| batch.iter().map(embedding_input).collect::<Vec<String>>())
        .enumerate()
        .collect();
    info!(chunks = chunks.len(), batches = batches.len(), "embedding chunks");

    let mut results: Vec<(usize, Result<Vec<Vec<f32>>, ServiceError>)> = stream::iter(batches.into_iter().map(
        |(idx, texts)| {
            let policy = &policy;
            async move {
                let vectors = policy.run("embed", || service.embed(&texts)).await;
                (idx, vectors)
            }
        },
    ))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;
    results.sort_by_key(|(idx, _)| *idx);

    let mut vectors = Vec::with_capacity(chunks.len());
    for (_, batch) in results {
        vectors.extend(batch?);
    }
    if vectors.len() != chunks.len() {
        return Err(ServiceError::Failed(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }

    let ids = document_ids(chunks);
    Ok(ids
        .into_iter()
        .zip(chunks)
        .zip(vectors)
        .map(|((id, chunk), vector)| EmbeddingRecord::new(id, chunk, vector))
        .collect())
}

/// Outcome of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub records: usize,
    pub batches: usize,
}

/// Fill `temp_index` with the records, swap it with `live_index` and drop
/// the old contents.
pub async fn upload_records<D: DocumentStore>(
    store: &D,
    records: &[EmbeddingRecord],
    live_index: &str,
    temp_index: &str,
    config: &EmbeddingConfig,
) -> Result<UploadSummary, ServiceError> {
    let policy = RetryPolicy::from_config(config);
    let mut batches = 0;
    for batch in records.chunks(config.upload_batch_size.max(1)) {
        policy.run("add_documents", || store.add_documents(temp_index, batch)).await?;
        batches += 1;
        debug!(index = temp_index, batch = batches, records = batch.len(), "uploaded batch");
    }
    policy
        .run("swap_indexes", || store.swap_indexes(live_index, temp_index))
        .await?;
    policy.run("delete_index", || store.delete_index(temp_index)).await?;

    info!(index = live_index, records = records.len(), batches = batches, "upload finished");
    Ok(UploadSummary {
        records: records.len(),
        batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{HashingEmbedder, JsonlStore};
    use crate::symbols::{PythonExtractor, SourceFile, SymbolIndex};
    use crate::types::ChunkKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn index() -> SymbolIndex {
        let files = vec![
            SourceFile::new("pkg/__init__.py", "from .models import Model, load\n"),
            SourceFile::new(
                "pkg/models.py",
                r#"class Model:
    """A model. Load one with [`load`]."""

    def forward(self, x):
        """Run the model on `x`."""


def load(name):
    """Load a [`Model`]."""
"#,
            ),
        ];
        PythonExtractor::new("pkg").extract(&files).unwrap()
    }

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn chunk(idx: usize) -> Chunk {
        Chunk {
            text: format!("Chunk {}.", idx),
            source: format!("page#s{}", idx % 3),
            library: "pkg".to_string(),
            page_title: "Page".to_string(),
            headings: vec!["# Page".to_string()],
            kind: ChunkKind::Prose,
        }
    }

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size: 2,
            concurrency: 3,
            upload_batch_size: 4,
            max_attempts: 3,
            retry_delay_ms: 1,
            dimensions: 8,
        }
    }

    /// Vector of a text is its length; the first `failures` calls are unavailable.
    struct FakeEmbedder {
        calls: AtomicUsize,
        failures: usize,
        hard_failure: bool,
    }

    impl FakeEmbedder {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                hard_failure: false,
            }
        }
    }

    impl EmbeddingService for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hard_failure {
                return Err(ServiceError::Failed("invalid input".to_string()));
            }
            if call < self.failures {
                return Err(ServiceError::Unavailable("overloaded".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        log: Mutex<Vec<String>>,
        fail_first_add: AtomicUsize,
    }

    impl DocumentStore for FakeStore {
        async fn add_documents(&self, index: &str, records: &[EmbeddingRecord]) -> Result<(), ServiceError> {
            if self.fail_first_add.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ServiceError::Unavailable("starting".to_string()));
            }
            self.log.lock().unwrap().push(format!("add {} {}", index, records.len()));
            Ok(())
        }

        async fn swap_indexes(&self, first: &str, second: &str) -> Result<(), ServiceError> {
            self.log.lock().unwrap().push(format!("swap {} {}", first, second));
            Ok(())
        }

        async fn delete_index(&self, index: &str) -> Result<(), ServiceError> {
            self.log.lock().unwrap().push(format!("delete {}", index));
            Ok(())
        }
    }

    #[test]
    fn test_create_chunks() {
        let docs = tempfile::tempdir().unwrap();
        write(
            docs.path(),
            "api/models.md",
            "# Models\n\nAll models. See [`load`].\n\n## Model\n\n[[autodoc]] Model\n    - forward\n\n<!-- hidden -->\nTrailing words.\n",
        );
        write(docs.path(), "index.md", "[[open-in-colab]]\n# Home\n\nStart with [`~pkg.Model`].\n");

        let set = create_chunks(docs.path(), &index(), &PageInfo::new("pkg"), 2000).unwrap();
        assert!(set.is_ok(), "{:?}", set.errors);
        assert_eq!(set.anchors, 2);

        let sources: Vec<&str> = set.chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "api/models#pkg.Model",
                "api/models#pkg.Model.forward",
                "api/models#models",
                "api/models#model",
                "index#home",
            ]
        );

        let class = &set.chunks[0];
        assert_eq!(class.kind, ChunkKind::Autodoc);
        assert_eq!(class.headings, vec!["# Models", "## Model"]);
        assert!(class.text.contains("pkg.Model"));
        assert!(!class.text.contains("<docstring>"));
        assert!(!class.text.contains("forward"));
        assert!(set.chunks[1].text.contains("Run the model"));

        // `load` is documented nowhere
        assert_eq!(set.chunks[2].text, "# Models\n\nAll models. See `load`.");
        assert_eq!(set.chunks[3].text, "# Models\n## Model\n\nTrailing words.");
        assert_eq!(set.chunks[4].text, "# Home\n\nStart with [Model](/docs/pkg/main/en/api/models#pkg.Model).");
        assert_eq!(set.chunks[4].page_title, "Index");
    }

    #[test]
    fn test_create_chunks_collects_errors() {
        let docs = tempfile::tempdir().unwrap();
        write(docs.path(), "a.md", "# A\n\n[[autodoc]] pkg.Missing\n\nText.\n");
        write(docs.path(), "b.md", "# B\n\n[[autodoc]] pkg.Model\n    - nope\n");
        write(docs.path(), "c.md", "# C\n\n```py\nopen\n");

        let set = create_chunks(docs.path(), &index(), &PageInfo::new("pkg"), 2000).unwrap();
        assert_eq!(set.errors.len(), 3);
        assert_eq!(set.errors[0].line, Some(3));
        assert!(set.errors[0].message.contains("pkg.Missing"));
        assert!(set.errors[2].file.ends_with("c.md"));
        // the rest of a failing page still yields chunks
        assert!(set.chunks.iter().any(|c| c.source == "a#a"));
    }

    #[tokio::test]
    async fn test_embed_chunks_keeps_order() {
        let chunks: Vec<Chunk> = (0..7).map(chunk).collect();
        let embedder = FakeEmbedder::new(2);

        let records = embed_chunks(&embedder, &chunks, &config()).await.unwrap();
        assert_eq!(records.len(), 7);
        for (record, chunk) in records.iter().zip(&chunks) {
            assert_eq!(record.vector, vec![embedding_input(chunk).len() as f32]);
            assert_eq!(record.text, chunk.text);
        }
        assert_eq!(records[0].id, "pkg-page-s0");
        assert_eq!(records[3].id, "pkg-page-s0-1");
        // four batches plus two retried calls
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_embed_chunks_fails_on_hard_error() {
        let chunks: Vec<Chunk> = (0..3).map(chunk).collect();
        let embedder = FakeEmbedder {
            hard_failure: true,
            ..FakeEmbedder::new(0)
        };
        let result = embed_chunks(&embedder, &chunks, &config()).await;
        assert!(matches!(result, Err(ServiceError::Failed(_))));
    }

    #[tokio::test]
    async fn test_embed_chunks_gives_up_when_unavailable() {
        let chunks: Vec<Chunk> = (0..1).map(chunk).collect();
        let embedder = FakeEmbedder::new(usize::MAX);
        let result = embed_chunks(&embedder, &chunks, &config()).await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_records_swaps_temp_index() {
        let chunks: Vec<Chunk> = (0..10).map(chunk).collect();
        let records = embed_chunks(&FakeEmbedder::new(0), &chunks, &config()).await.unwrap();
        let store = FakeStore::default();

        let summary = upload_records(&store, &records, "docs", "docs-temp", &config()).await.unwrap();
        assert_eq!(summary, UploadSummary { records: 10, batches: 3 });
        assert_eq!(
            *store.log.lock().unwrap(),
            vec![
                "add docs-temp 4",
                "add docs-temp 4",
                "add docs-temp 2",
                "swap docs docs-temp",
                "delete docs-temp",
            ]
        );
    }

    #[tokio::test]
    async fn test_local_index_replaces_live_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let embedder = HashingEmbedder::new(16);

        let first: Vec<Chunk> = (0..2).map(chunk).collect();
        let records = embed_chunks(&embedder, &first, &config()).await.unwrap();
        upload_records(&store, &records, "docs", "docs-tmp", &config()).await.unwrap();

        let second: Vec<Chunk> = (0..5).map(chunk).collect();
        let records = embed_chunks(&embedder, &second, &config()).await.unwrap();
        let summary = upload_records(&store, &records, "docs", "docs-tmp", &config()).await.unwrap();
        assert_eq!(summary, UploadSummary { records: 5, batches: 2 });

        let live: Vec<EmbeddingRecord> = std::fs::read_to_string(store.index_path("docs"))
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let ids: Vec<&str> = live.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["pkg-page-s0", "pkg-page-s1", "pkg-page-s2", "pkg-page-s0-1", "pkg-page-s1-1"]);
        assert!(live.iter().all(|r| r.vector.len() == 16));
        assert!(!store.index_path("docs-tmp").exists());
    }
}
