//! Routing and handler errors.

use thiserror::Error;

use crate::sql::DbError;

/// Raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The handler is not a function, controller, registered controller
    /// name, existing file, or alias of an already registered pattern.
    #[error("invalid handler for {pattern}: {reason}")]
    InvalidHandler { pattern: String, reason: String },

    /// The compiled pattern is not a valid regular expression.
    #[error("pattern {pattern} does not compile: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An empty method list was given.
    #[error("no HTTP method given for {0}")]
    NoMethod(String),
}

/// Raised by a handler while producing output.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<std::fmt::Error> for HandlerError {
    fn from(_: std::fmt::Error) -> Self {
        Self::msg("formatting output failed")
    }
}
