use thiserror::Error;

/// Errors surfaced by the live index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The underlying SQLite database rejected an operation.
    #[error("index database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// No device row exists with the given id.
    #[error("no device row for {0}")]
    UnknownDevice(String),
}
