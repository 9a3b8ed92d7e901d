//! Error types for treesql

use thiserror::Error;

/// Result type for treesql operations
pub type Result<T> = std::result::Result<T, TreeError>;

/// Error kinds surfaced by the store and its engines.
///
/// The routing layer maps these to response codes (`NotFound` -> 404,
/// `Conflict` -> 409, `AccessDenied` -> 403); that mapping is the caller's
/// concern, not ours.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("archive error: {0}")]
    Archive(String),
}

impl From<zip::result::ZipError> for TreeError {
    fn from(err: zip::result::ZipError) -> Self {
        TreeError::Archive(err.to_string())
    }
}

impl TreeError {
    /// True when the error names a missing node rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound(_))
    }
}
