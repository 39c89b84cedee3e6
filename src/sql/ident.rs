//! Trusted SQL text: schema identifiers and raw fragments.
//!
//! Statement builders take three kinds of input:
//! - [`Ident`]: table and column names, validated and always quoted
//! - [`Raw`]: caller-supplied SQL (where clauses, column lists, ORDER BY ...)
//!   that is pasted into the statement verbatim
//! - values, which only ever travel as bound parameters
//!
//! Nothing escapes a `Raw`. Building one from user input is an injection
//! hole and the caller's responsibility.

use std::fmt;

use crate::sql::error::{DbError, DbResult};

/// A validated schema identifier (`[A-Za-z_][A-Za-z0-9_]*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validate `name` as an identifier.
    pub fn new(name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(DbError::InvalidIdentifier(name))
        }
    }

    /// The bare name, unquoted.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for use inside statements.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Derive a new identifier by prefixing this one (`index_` + name).
    pub fn prefixed(&self, prefix: &str) -> DbResult<Self> {
        Self::new(format!("{prefix}{}", self.0))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl TryFrom<&str> for Ident {
    type Error = DbError;

    fn try_from(value: &str) -> DbResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Ident {
    type Error = DbError;

    fn try_from(value: String) -> DbResult<Self> {
        Self::new(value)
    }
}

/// Returns true if `name` is usable as an unquoted-safe identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Trusted SQL text pasted verbatim into a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Raw(String);

impl Raw {
    /// Wrap caller-trusted SQL.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Raw {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Raw {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// `(?, ?, ?)` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    format!("({})", vec!["?"; count].join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_validation() {
        assert!(Ident::new("kv_store").is_ok());
        assert!(Ident::new("_private").is_ok());
        assert!(Ident::new("T2").is_ok());

        assert!(Ident::new("").is_err());
        assert!(Ident::new("2fast").is_err());
        assert!(Ident::new("users; DROP TABLE users").is_err());
        assert!(Ident::new("a\"b").is_err());
    }

    #[test]
    fn test_ident_quoting() {
        let ident = Ident::new("key").unwrap();
        assert_eq!(ident.quoted(), "\"key\"");
        assert_eq!(ident.to_string(), "\"key\"");
        assert_eq!(ident.prefixed("index_").unwrap().as_str(), "index_key");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "(?)");
        assert_eq!(placeholders(3), "(?, ?, ?)");
    }
}
