//! Catalog Error Types

use thiserror::Error;

/// Errors from trouble-code parsing and lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Text is not a class letter followed by four hex digits
    #[error("Invalid trouble code: {0:?}")]
    InvalidCode(String),

    /// Well-formed code with no catalog entry
    #[error("Unknown trouble code: {0}")]
    UnknownCode(String),
}
