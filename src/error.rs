//! Error types for the media-bundle library.

use thiserror::Error;

/// Errors that can occur while downloading and bundling media.
#[derive(Error, Debug)]
pub enum Error {
    /// The run was cancelled through its cancellation token.
    #[error("Download cancelled by user")]
    Cancelled,

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the ZIP library.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The archive writer rejected an entry or could not be finalized.
    #[error("Archive error: {0}")]
    Archive(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No items were supplied.
    #[error("No files to download")]
    EmptyInput,

    /// Every item in the batch failed.
    #[error("All downloads failed")]
    AllFailed,
}

impl Error {
    /// Returns true if this error is a user-initiated cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if another attempt at the same request may succeed.
    ///
    /// Only transport-level failures qualify. Cancellation and archive
    /// failures are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. } | Self::Io(_))
    }
}

/// A specialized `Result` type for media-bundle operations.
pub type Result<T> = std::result::Result<T, Error>;
