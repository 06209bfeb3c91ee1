use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while converting and assembling documentation pages.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("code fence opened on line {line} is never closed")]
    UnclosedFence { line: usize },

    #[error("page has no top-level `#` heading")]
    MissingTitle,

    #[error("heading `{0}` appears before the page's top-level `#` heading")]
    HeadingBeforeTitle(String),

    #[error("unable to find {object} in {package}")]
    ObjectNotFound { object: String, package: String },

    #[error("unable to find {method} in {object}")]
    MethodNotFound { method: String, object: String },

    #[error("literalinclude error: {0}")]
    LiteralInclude(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One failure tied to a source file, collected during a full-corpus pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageError {
    pub file: PathBuf,
    pub line: Option<usize>,
    pub message: String,
}

impl PageError {
    pub fn new(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.file.display(), line, self.message),
            None => write!(f, "{}: {}", self.file.display(), self.message),
        }
    }
}

/// Consolidated report for a run that collected errors.
pub fn summarize_errors(errors: &[PageError]) -> String {
    let mut report = format!(
        "The documentation build failed with {} error(s):",
        errors.len()
    );
    for error in errors {
        report.push_str("\n- ");
        report.push_str(&error.to_string());
    }
    report
}
