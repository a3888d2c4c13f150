//! Error types for insights-core

use thiserror::Error;

/// Main error type for the insights-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Event failed construction-time validation
    #[error("invalid event: {0}")]
    Validation(String),

    /// Stored or wire record could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Network fault or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Ingestion endpoint answered with a non-200 status
    #[error("server rejected batch ({status}): {}", message.as_deref().unwrap_or("no message"))]
    Server { status: i32, message: Option<String> },

    /// No tracker was registered for this index
    #[error("index not registered: {0}")]
    IndexNotRegistered(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for insights-core
pub type Result<T> = std::result::Result<T, Error>;
