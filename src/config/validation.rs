//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, id length)
//! - Check identifier and shortcut token shapes before they reach SQL or
//!   the router
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SiteConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::SiteConfig;
use crate::sql::ident::is_identifier;

pub use crate::store::docstore::ID_LENGTH_RANGE;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &SiteConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if let Some(dsn) = &config.database.dsn {
        if !dsn.contains(':') {
            errors.push(ValidationError::new(
                "database.dsn",
                format!("{dsn:?} has no driver prefix"),
            ));
        }
    }

    if !is_identifier(&config.kv.table) {
        errors.push(ValidationError::new(
            "kv.table",
            format!("{:?} is not an identifier", config.kv.table),
        ));
    }
    if !is_identifier(&config.docstore.table) {
        errors.push(ValidationError::new(
            "docstore.table",
            format!("{:?} is not an identifier", config.docstore.table),
        ));
    }
    if !ID_LENGTH_RANGE.contains(&config.docstore.id_length) {
        errors.push(ValidationError::new(
            "docstore.id_length",
            format!(
                "must be between {} and {}",
                ID_LENGTH_RANGE.start(),
                ID_LENGTH_RANGE.end()
            ),
        ));
    }
    for index in &config.docstore.indexes {
        if !is_identifier(&index.name) {
            errors.push(ValidationError::new(
                "docstore.indexes",
                format!("{:?} is not an identifier", index.name),
            ));
        }
    }

    for shortcut in &config.router.shortcuts {
        let token = &shortcut.token;
        if token.len() < 3 || !token.starts_with('{') || !token.ends_with('}') {
            errors.push(ValidationError::new(
                "router.shortcuts",
                format!("token {token:?} must look like {{name}}"),
            ));
        }
        if let Err(e) = regex::Regex::new(&shortcut.pattern) {
            errors.push(ValidationError::new(
                "router.shortcuts",
                format!("pattern for {token} does not compile: {e}"),
            ));
        }
    }
    if !config.router.mount_path.is_empty() && !config.router.mount_path.starts_with('/') {
        errors.push(ValidationError::new("router.mount_path", "must start with '/'"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
