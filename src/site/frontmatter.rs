//! Heading slugs and the YAML navigation preamble of a page.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::markup::scan::{is_empty_line, FenceState};
use crate::types::DocError;

static HEADING: OnceLock<Regex> = OnceLock::new();
static HEADING_ID: OnceLock<Regex> = OnceLock::new();

fn heading_re() -> &'static Regex {
    HEADING.get_or_init(|| Regex::new(r"^(#+)\s+(\S.*)$").expect("heading regex should compile"))
}

fn heading_id_re() -> &'static Regex {
    HEADING_ID.get_or_init(|| Regex::new(r"\[\[(.*)\]\]").expect("heading id regex should compile"))
}

/// One heading in the navigation tree of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingNode {
    pub title: String,
    pub local: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<HeadingNode>,
}

/// Heading text as a URL fragment: lowercase ASCII alphanumerics joined by hyphens.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

/// A parsed heading line: level, title without id override, and slug.
pub fn parse_heading(line: &str) -> Option<(usize, String, String)> {
    let caps = heading_re().captures(line)?;
    let level = caps[1].len();
    let title = &caps[2];
    match heading_id_re().captures(title) {
        Some(id) => {
            let local = id[1].trim().to_string();
            let title = heading_id_re().replace(title, "").trim().to_string();
            Some((level, title, local))
        }
        None => Some((level, title.trim().to_string(), slugify(title))),
    }
}

/// Tree under construction. Placeholders (no heading) fill level gaps.
#[derive(Debug, Default)]
struct Node {
    heading: Option<(String, String)>,
    children: Vec<Node>,
}

impl Node {
    fn new(title: String, local: String) -> Self {
        Self {
            heading: Some((title, local)),
            children: Vec::new(),
        }
    }

    /// Attach a level-`level` heading under the last open branch.
    fn add_child(&mut self, child: Node, level: usize) {
        let mut parent = self;
        for _ in 2..level {
            if parent.children.is_empty() {
                parent.children.push(Node::default());
            }
            let last = parent.children.len() - 1;
            parent = &mut parent.children[last];
        }
        parent.children.push(child);
    }

    /// Headings of this subtree with placeholders spliced out.
    fn into_headings(self) -> Vec<HeadingNode> {
        let sections: Vec<HeadingNode> = self
            .children
            .into_iter()
            .flat_map(Node::into_headings)
            .collect();
        match self.heading {
            Some((title, local)) => vec![HeadingNode {
                title,
                local,
                sections,
            }],
            None => sections,
        }
    }
}

/// Page with headings rewritten and its heading tree.
#[derive(Debug, Clone)]
pub struct IndexedPage {
    pub root: HeadingNode,
    pub text: String,
}

/// Rewrite headings with anchor suffixes and collect them into a tree.
///
/// The last `#` heading of the page becomes the root.
pub fn index_headings(text: &str) -> Result<IndexedPage, DocError> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let mut fence = FenceState::new();
    let mut root: Option<Node> = None;

    for (idx, line) in lines.iter_mut().enumerate() {
        if fence.update(idx, line) || is_empty_line(line) {
            continue;
        }
        let Some((level, title, local)) = parse_heading(line) else {
            continue;
        };
        *line = format!(
            "{} {} <a id=\"{local}\" href=\"#{local}\">¶</a>",
            "#".repeat(level),
            title,
            local = local
        );

        let node = Node::new(title.clone(), local);
        if level == 1 {
            root = Some(node);
            continue;
        }
        match root.as_mut() {
            Some(root) => root.add_child(node, level),
            None => return Err(DocError::HeadingBeforeTitle(title)),
        }
    }

    let root = root
        .ok_or(DocError::MissingTitle)?
        .into_headings()
        .into_iter()
        .next()
        .ok_or(DocError::MissingTitle)?;
    Ok(IndexedPage {
        root,
        text: lines.join("\n"),
    })
}

/// Prefix a page with its `---` framed YAML heading tree.
pub fn generate_frontmatter(text: &str) -> Result<String, DocError> {
    let page = index_headings(text)?;
    let yaml = serde_yaml::to_string(&page.root)?;
    Ok(format!("---\n{}---\n{}", yaml, page.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Quick tour"), "quick-tour");
        assert_eq!(slugify("  What's new in v2.0?  "), "whats-new-in-v20");
        assert_eq!(slugify("Multi   space -- and dashes"), "multi-space-and-dashes");
        assert_eq!(slugify("Ünïcode ok"), "ncode-ok");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slug_shape_and_stability() {
        for title in ["- Leading dash", "Trailing -", "A_b c", "Tab\tseparated", "🤗 Hub"] {
            let slug = slugify(title);
            assert_eq!(slug, slugify(title));
            assert!(!slug.starts_with('-') && !slug.ends_with('-'), "{slug}");
            assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn test_identical_headings_share_a_slug() {
        let page = index_headings("# T\n\n## Usage\n\n## Usage").unwrap();
        assert_eq!(page.root.sections.len(), 2);
        assert_eq!(page.root.sections[0].local, page.root.sections[1].local);
    }

    #[test]
    fn test_parse_heading_with_id_override() {
        assert_eq!(
            parse_heading("## BertModel[[transformers.BertModel]]"),
            Some((2, "BertModel".to_string(), "transformers.BertModel".to_string()))
        );
        assert_eq!(
            parse_heading("### Custom [[my-id]]"),
            Some((3, "Custom".to_string(), "my-id".to_string()))
        );
        assert_eq!(parse_heading("#hashtag"), None);
    }

    #[test]
    fn test_generate_frontmatter() {
        let text = "# Models\n\nIntro.\n\n```py\n# not a heading\n```\n\n## BERT[[bert]]\n\n### Usage\n\n## GPT";
        let expected = r##"---
title: Models
local: models
sections:
- title: BERT
  local: bert
  sections:
  - title: Usage
    local: usage
- title: GPT
  local: gpt
---
# Models <a id="models" href="#models">¶</a>

Intro.

```py
# not a heading
```

## BERT <a id="bert" href="#bert">¶</a>

### Usage <a id="usage" href="#usage">¶</a>

## GPT <a id="gpt" href="#gpt">¶</a>"##;
        assert_eq!(generate_frontmatter(text).unwrap(), expected);
    }

    #[test]
    fn test_level_gap_placeholder_is_pruned() {
        let page = index_headings("# Root\n### Deep\n## Mid\n### Leaf").unwrap();
        let titles: Vec<&str> = page.root.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Deep", "Mid"]);
        assert_eq!(page.root.sections[1].sections[0].title, "Leaf");
    }

    #[test]
    fn test_last_title_wins() {
        let page = index_headings("# First\n## A\n# Second\n## B").unwrap();
        assert_eq!(page.root.title, "Second");
        assert_eq!(page.root.sections.len(), 1);
        assert_eq!(page.root.sections[0].title, "B");
    }

    #[test]
    fn test_missing_title() {
        assert!(matches!(index_headings("No headings here."), Err(DocError::MissingTitle)));
        assert!(matches!(
            index_headings("## Sub\n# Title"),
            Err(DocError::HeadingBeforeTitle(title)) if title == "Sub"
        ));
    }
}
