//! API documentation generated from a symbol table.

mod directive;
mod render;

pub use directive::{parse_directive, resolve_autodoc, Directive};
pub use render::{autodoc, canonical_anchor, ObjectAnchor};
