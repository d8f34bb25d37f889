//! Translate-time error taxonomy.
//!
//! Translation either completes or aborts with a single error; no partial
//! output is ever written. The driver prints the error and exits non-zero.

use std::path::PathBuf;

/// Errors that can abort a translation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host parser rejected the input.
    #[error("parse error: {0}")]
    Parse(String),

    /// The input parsed, but uses syntax outside the supported subset.
    #[error("line {line}: {message}")]
    Unsupported { line: u32, message: String },

    /// An imported module could not be located on the search path.
    #[error("line {line}: no module named '{module}'")]
    Import { line: u32, module: String },

    /// Input unreadable or output unwritable.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An input path with no usable file stem.
    #[error("bad input path: {0}")]
    BadPath(PathBuf),
}

impl Error {
    /// Shorthand for the unsupported-syntax variant.
    pub fn unsupported(line: u32, message: impl Into<String>) -> Self {
        Error::Unsupported {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
