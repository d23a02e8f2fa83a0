//! Common error types for cryoqc

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for cryoqc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across cryoqc components
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata store access error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A finished output could not replace the previous version
    #[error("Cannot publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
