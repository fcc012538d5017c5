/*!
Error types for the filevault core.
*/

use thiserror::Error;

/// Result type used throughout the filevault core.
pub type Result<T> = std::result::Result<T, FileVaultError>;

/// Errors that can occur during persistence and retrieval operations.
///
/// The taxonomy distinguishes caller-correctable failures (`Validation`,
/// `Configuration`) from critical system failures (`Storage`, `Archive`,
/// `Io`). `NotFound` and `BucketNotFound` are critical subtypes the object
/// store reports for a missing key/version or container, kept separate so
/// callers can detect "already deleted" conditions.
#[derive(Error, Debug)]
pub enum FileVaultError {
    /// I/O errors during staging and temp-file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required field or payload is missing or malformed; the caller can
    /// fix the input and retry
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller configuration errors, such as a base path without a trailing
    /// separator or a missing bucket name
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend or filesystem failures that are not expected to be
    /// caller-correctable
    #[error("Storage error: {0}")]
    Storage(String),

    /// The backend reports that the requested key or version does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The backend reports that the requested bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Archive creation or extraction failures, including a missing or
    /// corrupted archive entry
    #[error("Archive error: {0}")]
    Archive(String),
}

impl FileVaultError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new bucket-not-found error
    pub fn bucket_not_found<S: Into<String>>(msg: S) -> Self {
        Self::BucketNotFound(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Whether the error is caller-correctable (fix the input and retry)
    /// rather than a critical system failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Configuration(_))
    }

    /// Whether the error is the backend's "key/version/bucket does not
    /// exist" report.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::BucketNotFound(_))
    }
}
