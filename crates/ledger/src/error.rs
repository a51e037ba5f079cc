//! Error types for the ledger crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store could not be opened at the given path
    #[error("failed to open store at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Keys must be non-empty
    #[error("record key must not be empty")]
    EmptyKey,
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;
