//! Anchor table: where every documented object lives.
//!
//! Filled page by page during the first pass, then frozen into an
//! [`AnchorMap`] that the second pass reads.

use std::collections::HashMap;

use tracing::warn;

use crate::autodoc::ObjectAnchor;
use crate::types::PageInfo;

/// Page (without suffix) and fragment an anchor points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorTarget {
    pub page: String,
    /// Fragment on the page when it differs from the anchor itself.
    pub fragment: Option<String>,
}

impl AnchorTarget {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            fragment: None,
        }
    }

    pub fn with_fragment(page: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            fragment: Some(fragment.into()),
        }
    }

    /// Absolute link to `anchor` in the docs tree.
    pub fn link(&self, anchor: &str, page_info: &PageInfo) -> String {
        format!(
            "{}/{}#{}",
            page_info.docs_base(),
            self.page,
            self.fragment.as_deref().unwrap_or(anchor)
        )
    }
}

/// Accumulator used during the first pass. First writer wins.
#[derive(Debug, Default)]
pub struct AnchorTable {
    primaries: HashMap<String, AnchorTarget>,
    aliases: HashMap<String, AnchorTarget>,
}

impl AnchorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primary anchor. Returns false (and keeps the first page) on collision.
    pub fn insert(&mut self, anchor: impl Into<String>, page: impl Into<String>) -> bool {
        let anchor = anchor.into();
        let page = page.into();
        if let Some(existing) = self.primaries.get(&anchor) {
            warn!(
                anchor = %anchor,
                kept = %existing.page,
                ignored = %page,
                "anchor documented on more than one page"
            );
            return false;
        }
        self.primaries.insert(anchor, AnchorTarget::new(page));
        true
    }

    /// Register an alias pointing at `fragment` on `page`.
    pub fn insert_alias(
        &mut self,
        anchor: impl Into<String>,
        page: impl Into<String>,
        fragment: impl Into<String>,
    ) {
        self.aliases
            .entry(anchor.into())
            .or_insert_with(|| AnchorTarget::with_fragment(page, fragment));
    }

    /// Register everything one page documented.
    pub fn extend_page(&mut self, page: &str, anchors: &[ObjectAnchor]) {
        for anchor in anchors {
            match &anchor.alias_of {
                None => {
                    self.insert(anchor.anchor.clone(), page);
                }
                Some(target) => self.insert_alias(anchor.anchor.clone(), page, target.clone()),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.primaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primaries.is_empty()
    }

    /// Finish the first pass. Aliases only fill anchors no page documents directly.
    pub fn freeze(self) -> AnchorMap {
        let mut entries = self.primaries;
        for (anchor, target) in self.aliases {
            entries.entry(anchor).or_insert(target);
        }
        AnchorMap { entries }
    }
}

/// Read-only anchor lookup for the second pass.
#[derive(Debug, Clone, Default)]
pub struct AnchorMap {
    entries: HashMap<String, AnchorTarget>,
}

impl AnchorMap {
    pub fn get(&self, anchor: &str) -> Option<&AnchorTarget> {
        self.entries.get(anchor)
    }

    pub fn contains(&self, anchor: &str) -> bool {
        self.entries.contains_key(anchor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A: Into<String>, P: Into<String>> FromIterator<(A, P)> for AnchorMap {
    fn from_iter<I: IntoIterator<Item = (A, P)>>(iter: I) -> Self {
        let mut table = AnchorTable::new();
        for (anchor, page) in iter {
            table.insert(anchor, page);
        }
        table.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let mut table = AnchorTable::new();
        assert!(table.insert("pkg.Foo", "main_classes/foo"));
        assert!(!table.insert("pkg.Foo", "other"));
        assert_eq!(table.len(), 1);

        let map = table.freeze();
        assert_eq!(map.get("pkg.Foo").unwrap().page, "main_classes/foo");
    }

    #[test]
    fn test_alias_never_overrides_primary() {
        let mut table = AnchorTable::new();
        table.extend_page(
            "model_doc/child",
            &[
                ObjectAnchor::primary("pkg.Child"),
                ObjectAnchor::primary("pkg.Child.run"),
                ObjectAnchor::alias("pkg.Base.run", "pkg.Child.run"),
                ObjectAnchor::alias("pkg.Base.stop", "pkg.Child.stop"),
            ],
        );
        table.insert("pkg.Base.run", "model_doc/base");

        let map = table.freeze();
        assert_eq!(map.len(), 4);
        assert_eq!(map.get("pkg.Base.run"), Some(&AnchorTarget::new("model_doc/base")));
        assert_eq!(
            map.get("pkg.Base.stop"),
            Some(&AnchorTarget::with_fragment("model_doc/child", "pkg.Child.stop"))
        );
    }

    #[test]
    fn test_target_link() {
        let page_info = PageInfo::new("pkg");
        let target = AnchorTarget::new("a");
        assert_eq!(target.link("pkg.Foo", &page_info), "/docs/pkg/main/en/a#pkg.Foo");
        let alias = AnchorTarget::with_fragment("a", "pkg.Child.run");
        assert_eq!(alias.link("pkg.Base.run", &page_info), "/docs/pkg/main/en/a#pkg.Child.run");
    }

    #[test]
    fn test_from_pairs() {
        let map: AnchorMap = [("pkg.Foo", "a.html"), ("pkg.Foo.bar", "a.html")].into_iter().collect();
        assert!(map.contains("pkg.Foo.bar"));
        assert!(!map.contains("pkg.Missing"));
    }
}
