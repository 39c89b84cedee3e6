//! Error types for the relational access layer.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by the relational access layer.
///
/// Prepare failures are not represented here: builders report them as
/// `Ok(None)` to the immediate caller.
#[derive(Debug, Error)]
pub enum DbError {
    /// The connection could not be established.
    #[error("connection to {dsn} failed: {reason}")]
    Connection {
        /// The DSN that was used.
        dsn: String,
        /// Why the connection failed.
        reason: String,
    },

    /// A prepared statement failed while executing.
    #[error("statement execution failed: {0}")]
    Execution(#[from] rusqlite::Error),

    /// A schema identifier did not pass validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A document payload could not be interpreted.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression or decompression of a document body failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),
}
