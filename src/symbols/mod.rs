//! Precomputed symbol tables standing in for live package introspection.

mod error;
mod python;
mod table;

pub use python::PythonExtractor;
#[cfg(test)]
pub use python::SourceFile;
pub use table::{Parameter, SymbolId, SymbolIndex, SymbolKind, SymbolTable};
