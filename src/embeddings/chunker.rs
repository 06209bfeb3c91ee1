//! Splitting pages into retrieval chunks.
//!
//! Prose is arranged into a heading tree; each node's body is cut into
//! sentences (code blocks stay whole) and packed greedily into chunks that
//! carry the heading breadcrumb of their node.

use std::sync::OnceLock;

use regex::Regex;

use crate::autodoc::{parse_directive, Directive};
use crate::markup::scan::FenceState;
use crate::site::parse_heading;
use crate::types::{Chunk, ChunkKind};

static HTML_COMMENT: OnceLock<Regex> = OnceLock::new();
static FRAMEWORK_CONTENT: OnceLock<Regex> = OnceLock::new();
static SENTENCE_END: OnceLock<Regex> = OnceLock::new();

fn html_comment_re() -> &'static Regex {
    HTML_COMMENT.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex should compile"))
}

fn framework_content_re() -> &'static Regex {
    FRAMEWORK_CONTENT.get_or_init(|| {
        Regex::new(r"(?s)<frameworkcontent>.*?<pt>(.*?)</pt>.*?</frameworkcontent>")
            .expect("framework regex should compile")
    })
}

fn sentence_end_re() -> &'static Regex {
    SENTENCE_END.get_or_init(|| Regex::new(r"\.\s+").expect("sentence regex should compile"))
}

/// Drop notebook markers and comments, keep only the PyTorch side of framework blocks.
pub fn clean_md(text: &str) -> String {
    let text = text.replace("[[open-in-colab]]", "");
    let text = html_comment_re().replace_all(&text, "");
    let text = framework_content_re().replace_all(&text, |caps: &regex::Captures| caps[1].trim().to_string());
    text.trim().to_string()
}

/// Display title of a page: `api/schedulers/lms_discrete` gives `Lms discrete`.
pub fn page_title(page: &str) -> String {
    let last = page.rsplit('/').next().unwrap_or(page).replace('_', " ").to_lowercase();
    let mut chars = last.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sentences and whole code blocks of a body, in order.
pub fn split_markdown(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Vec<&str> = Vec::new();
    let mut fence = FenceState::new();

    for (idx, line) in text.split('\n').enumerate() {
        if fence.update(idx, line) {
            if !prose.is_empty() {
                tokens.extend(split_sentences(&prose.join("\n")));
                prose.clear();
            }
            code.push(line);
            if !fence.in_code() {
                tokens.push(code.join("\n"));
                code.clear();
            }
        } else {
            prose.push(line);
        }
    }
    if !prose.is_empty() {
        tokens.extend(split_sentences(&prose.join("\n")));
    }
    if !code.is_empty() {
        tokens.push(code.join("\n"));
    }
    tokens
}

/// Sentences end at a period followed by whitespace. The period stays.
fn split_sentences(prose: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for end in sentence_end_re().find_iter(prose) {
        let sentence = prose[last..end.start() + 1].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = end.end();
    }
    let rest = prose[last..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

#[derive(Debug, Default)]
struct ChunkNode {
    /// `## Title` with any id override removed. `None` for level-gap placeholders.
    heading: Option<String>,
    slug: String,
    body: Vec<String>,
    children: Vec<usize>,
}

/// Page-level settings shared by every chunk of the page.
#[derive(Debug, Clone)]
pub struct PageChunker<'a> {
    /// Page name without suffix (`model_doc/bert`).
    pub page: &'a str,
    pub library: &'a str,
    pub chunk_len_chars: usize,
}

impl PageChunker<'_> {
    fn chunk(&self, text: String, fragment: &str, headings: Vec<String>, kind: ChunkKind) -> Chunk {
        Chunk {
            text,
            source: format!("{}#{}", self.page, fragment),
            library: self.library.to_string(),
            page_title: page_title(self.page),
            headings,
            kind,
        }
    }

    /// Chunk the prose of a page. Text before the first heading is dropped.
    pub fn markdown_chunks(&self, text: &str) -> Vec<Chunk> {
        // node 0 is a headless top that every level-1 heading hangs from
        let mut nodes = vec![ChunkNode::default()];
        let mut current: Option<usize> = None;
        let mut fence = FenceState::new();

        for (idx, line) in text.split('\n').enumerate() {
            let in_code = fence.update(idx, line);
            let heading = if in_code { None } else { parse_heading(line) };
            let Some((level, title, slug)) = heading else {
                if let Some(node) = current {
                    nodes[node].body.push(line.to_string());
                }
                continue;
            };

            let mut parent = 0;
            for _ in 1..level {
                if nodes[parent].children.is_empty() {
                    nodes.push(ChunkNode::default());
                    let placeholder = nodes.len() - 1;
                    nodes[parent].children.push(placeholder);
                }
                if let Some(last) = nodes[parent].children.last() {
                    parent = *last;
                }
            }
            nodes.push(ChunkNode {
                heading: Some(format!("{} {}", "#".repeat(level), title)),
                slug,
                ..Default::default()
            });
            let id = nodes.len() - 1;
            nodes[parent].children.push(id);
            current = Some(id);
        }

        let mut chunks = Vec::new();
        self.collect(&nodes, 0, &[], &mut chunks);
        chunks
    }

    /// Pre-order: a node's own chunks, then its children's.
    fn collect(&self, nodes: &[ChunkNode], id: usize, parents: &[String], chunks: &mut Vec<Chunk>) {
        let node = &nodes[id];
        let mut headings = parents.to_vec();
        if let Some(heading) = &node.heading {
            headings.push(heading.clone());
        }

        let tokens = split_markdown(&node.body.join("\n"));
        let prefix = if headings.is_empty() {
            String::new()
        } else {
            format!("{}\n\n", headings.join("\n"))
        };
        let mut body = String::new();
        for token in tokens {
            let added = if body.is_empty() { token.len() } else { token.len() + 1 };
            if !body.is_empty() && prefix.len() + body.len() + added > self.chunk_len_chars {
                let text = format!("{}{}", prefix, body);
                chunks.push(self.chunk(text, &node.slug, headings.clone(), ChunkKind::Prose));
                body.clear();
            }
            if !body.is_empty() {
                body.push(' ');
            }
            body.push_str(&token);
        }
        if !body.is_empty() {
            let text = format!("{}{}", prefix, body);
            chunks.push(self.chunk(text, &node.slug, headings.clone(), ChunkKind::Prose));
        }

        for child in &node.children {
            self.collect(nodes, *child, &headings, chunks);
        }
    }

    /// Chunk of one rendered object, located at its anchor.
    pub fn autodoc_chunk(&self, text: String, anchor: &str, headings: Vec<String>) -> Chunk {
        self.chunk(text, anchor, headings, ChunkKind::Autodoc)
    }
}

/// A directive together with the headings it sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedDirective {
    pub directive: Directive,
    pub headings: Vec<String>,
}

/// Pull the `[[autodoc]]` blocks out of a page.
///
/// Returns the remaining prose and each directive with its heading path.
pub fn extract_autodoc(text: &str) -> (String, Vec<PlacedDirective>) {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut prose: Vec<&str> = Vec::with_capacity(lines.len());
    let mut placed = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut fence = FenceState::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if !fence.in_code() {
            if let Some((directive, next)) = parse_directive(&lines, idx) {
                placed.push(PlacedDirective {
                    directive,
                    headings: stack.iter().map(|(_, heading)| heading.clone()).collect(),
                });
                idx = next;
                continue;
            }
        }
        let in_code = fence.update(idx, line);
        if !in_code {
            if let Some((level, title, _)) = parse_heading(line) {
                while stack.last().is_some_and(|(open, _)| *open >= level) {
                    stack.pop();
                }
                stack.push((level, format!("{} {}", "#".repeat(level), title)));
            }
        }
        prose.push(line);
        idx += 1;
    }

    (prose.join("\n"), placed)
}
