use serde::{Deserialize, Serialize};

/// A retrieval unit cut from one documentation page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, including the heading breadcrumb for prose chunks.
    pub text: String,

    /// `page#fragment` locator.
    pub source: String,

    /// Library the page documents.
    pub library: String,

    /// Human title derived from the page path.
    pub page_title: String,

    /// Heading path the chunk sits under, outermost first, with their `#` marks.
    pub headings: Vec<String>,

    /// Where the text came from.
    pub kind: ChunkKind,
}

impl Chunk {
    /// Page part of the locator.
    pub fn page(&self) -> &str {
        self.source
            .split_once('#')
            .map_or(self.source.as_str(), |(page, _)| page)
    }

    /// Fragment part of the locator, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.source.split_once('#').map(|(_, fragment)| fragment)
    }

    /// Headings keyed by their level (1..=5), as stored on embedding records.
    pub fn heading_levels(&self) -> [Option<String>; 5] {
        let mut levels: [Option<String>; 5] = Default::default();
        for heading in &self.headings {
            let level = heading.chars().take_while(|c| *c == '#').count();
            if (1..=5).contains(&level) {
                levels[level - 1] = Some(heading.clone());
            }
        }
        levels
    }
}

/// Origin of a chunk's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Page prose split at sentence boundaries.
    Prose,
    /// Rendered documentation of one package object.
    Autodoc,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Prose => "prose",
            ChunkKind::Autodoc => "autodoc",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prose" => Ok(ChunkKind::Prose),
            "autodoc" => Ok(ChunkKind::Autodoc),
            _ => Err(format!("unknown chunk kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, headings: &[&str]) -> Chunk {
        Chunk {
            text: "text".to_string(),
            source: source.to_string(),
            library: "pkg".to_string(),
            page_title: "Page".to_string(),
            headings: headings.iter().map(|h| h.to_string()).collect(),
            kind: ChunkKind::Prose,
        }
    }

    #[test]
    fn test_locator_parts() {
        let c = chunk("model_doc/bert#usage", &[]);
        assert_eq!(c.page(), "model_doc/bert");
        assert_eq!(c.fragment(), Some("usage"));

        let c = chunk("index", &[]);
        assert_eq!(c.page(), "index");
        assert_eq!(c.fragment(), None);
    }

    #[test]
    fn test_heading_levels() {
        let c = chunk("p#x", &["# Title", "### Deep"]);
        let levels = c.heading_levels();
        assert_eq!(levels[0].as_deref(), Some("# Title"));
        assert_eq!(levels[1], None);
        assert_eq!(levels[2].as_deref(), Some("### Deep"));
    }

    #[test]
    fn test_chunk_kind_from_str() {
        assert_eq!("prose".parse::<ChunkKind>().unwrap(), ChunkKind::Prose);
        assert_eq!("autodoc".parse::<ChunkKind>().unwrap(), ChunkKind::Autodoc);
        assert!("other".parse::<ChunkKind>().is_err());
        assert_eq!(ChunkKind::Autodoc.to_string(), "autodoc");
    }
}
