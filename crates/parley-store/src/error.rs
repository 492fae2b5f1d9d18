use thiserror::Error;

/// Errors produced by the store layer.
///
/// `Validation`, `NotFound` and `Unauthorized` are the caller-facing
/// rejections: each is raised before anything is written.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or missing input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced message or identity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The actor has no right to perform the mutation.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A JSON-encoded column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
