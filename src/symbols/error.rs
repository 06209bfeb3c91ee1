use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("tree-sitter error: {0}")]
    TreeSitter(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid package directory: {0}")]
    InvalidPackage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid symbol index: {0}")]
    Json(#[from] serde_json::Error),

    #[error("inconsistent symbol index: {0}")]
    InvalidIndex(String),
}
