//! Cache and fetch error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Network fetch failures. All are recoverable at the loader level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Could not connect or the transfer broke off.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request or body read timed out.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Non-success status or an unreadable body.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Classifies a `reqwest` error.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Connection(err.to_string())
        } else {
            Self::MalformedResponse(err.to_string())
        }
    }
}

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A cache operation ran before `initialize`.
    #[error("image loader is not initialized")]
    Uninitialized,
    /// Empty or malformed key or locator.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The disk tier is degraded for this process.
    #[error("disk cache unavailable: {0}")]
    CacheUnavailable(String),
    /// Another writer holds the entry; skip writing.
    #[error("write already in progress for {0}")]
    WriteInProgress(String),
    /// Network failure.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    /// Failed to decode image.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
}

impl CacheError {
    /// Returns whether the caller should proceed without writing rather than fail.
    #[must_use]
    pub const fn is_write_in_progress(&self) -> bool {
        matches!(self, Self::WriteInProgress(_))
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        Self::DecodeError(err.to_string())
    }
}
