//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file is a valid configuration:
//! a site on `0.0.0.0:8080` with no database.

use serde::{Deserialize, Serialize};

use crate::http::request::PathSource;
use crate::routing::MatchPolicy;

/// Root configuration for a site.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    pub listener: ListenerConfig,
    pub timeouts: TimeoutConfig,
    pub database: DatabaseConfig,
    pub kv: KvConfig,
    pub docstore: DocStoreConfig,
    pub router: RouterConfig,
    pub site: SiteSection,
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Database connection. Without a DSN the site runs with no data services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// e.g. `sqlite:/var/lib/site.db` or `sqlite::memory:`.
    pub dsn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub synchronous_off: bool,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            username: None,
            password: None,
            synchronous_off: false,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KvConfig {
    pub enabled: bool,
    pub table: String,
    /// Run read-modify-write operations inside a transaction.
    pub locking: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: "kv".to_string(),
            locking: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocStoreConfig {
    pub enabled: bool,
    pub table: String,
    /// Length of generated document ids.
    pub id_length: usize,
    /// Index tables created at startup.
    pub indexes: Vec<IndexConfig>,
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: "docs".to_string(),
            id_length: crate::store::docstore::DEFAULT_ID_LENGTH,
            indexes: Vec::new(),
        }
    }
}

/// One document index table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Indexed field; the table is `index_<name>`.
    pub name: String,

    /// Column type of the indexed value.
    #[serde(default = "default_index_type")]
    pub sql_type: String,
}

fn default_index_type() -> String {
    "TEXT".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    pub match_policy: MatchPolicy,
    pub path_source: PathSource,
    /// Prefix stripped from request paths before routing.
    pub mount_path: String,
    /// Extra shortcut tokens, applied after the built-in ones.
    pub shortcuts: Vec<ShortcutConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShortcutConfig {
    /// Token including braces, e.g. `{slug}`.
    pub token: String,
    /// Regex fragment the token expands to.
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteSection {
    /// Base for relative redirect targets.
    pub base_url: String,
    /// `X-Powered-By` value; empty disables the header.
    pub powered_by: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: "/".to_string(),
            powered_by: concat!("sitekit/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.database.dsn.is_none());
        assert_eq!(config.kv.table, "kv");
        assert_eq!(config.router.match_policy, MatchPolicy::FirstMatch);
        assert_eq!(config.site.base_url, "/");
    }

    #[test]
    fn test_full_config_parses() {
        let config: SiteConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:3000"

            [database]
            dsn = "sqlite::memory:"

            [kv]
            locking = true

            [docstore]
            id_length = 20
            indexes = [{ name = "tag" }, { name = "year", sql_type = "INTEGER" }]

            [router]
            match_policy = "every_bucket"
            path_source = "query"
            mount_path = "/site"
            shortcuts = [{ token = "{slug}", pattern = "([a-z-]+)" }]

            [site]
            powered_by = ""
            "#,
        )
        .unwrap();

        assert_eq!(config.database.dsn.as_deref(), Some("sqlite::memory:"));
        assert!(config.kv.locking);
        assert_eq!(config.docstore.indexes[0].sql_type, "TEXT");
        assert_eq!(config.docstore.indexes[1].sql_type, "INTEGER");
        assert_eq!(config.router.match_policy, MatchPolicy::EveryBucket);
        assert_eq!(config.router.path_source, PathSource::Query);
        assert_eq!(config.router.shortcuts[0].token, "{slug}");
        assert_eq!(config.site.powered_by, "");
    }
}
