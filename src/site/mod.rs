//! Site build: anchors, cross-references, frontmatter and link checking.

mod anchors;
mod frontmatter;
mod links;
mod pipeline;
mod xref;

pub use anchors::AnchorTable;
pub use frontmatter::parse_heading;
pub use links::check_links;
pub use pipeline::{build_site, collect_pages, convert_page, read_source, SourcePage};
pub use xref::resolve_links_in_text;
