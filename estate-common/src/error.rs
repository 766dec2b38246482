//! Error types for the Estate services.

use thiserror::Error;

/// Result type alias using the Estate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Estate services.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream model or gateway error
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// The request was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            // nginx convention for a client that went away mid-request
            Self::Cancelled => 499,
            Self::External(_) => 502,
            Self::Internal(_) => 500,
        }
    }
}
