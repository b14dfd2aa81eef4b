//! Connection configuration.
//!
//! A [`ConnectionConfig`] names the adapter to use and the database to open,
//! plus any adapter specific options. It can be built in code, deserialized
//! from JSON or parsed from a short URL form:
//!
//! ```
//! use sqlrecord_core::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_url("sqlite::memory:").unwrap();
//! assert_eq!(config.adapter.as_deref(), Some("sqlite"));
//! assert_eq!(config.database.as_deref(), Some(":memory:"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigErrorKind, Error, Result};

/// Database name SQLite uses for a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Settings used to establish a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Registered adapter name. Establishing without one is an error.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Database name or path.
    #[serde(default)]
    pub database: Option<String>,
    /// Adapter specific options.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ConnectionConfig {
    /// Config for the named adapter.
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
            ..Self::default()
        }
    }

    /// Set the database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set an adapter option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up an adapter option.
    pub fn get_option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// Parse a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::config(
                ConfigErrorKind::InvalidDeclaration,
                format!("invalid connection configuration: {e}"),
            )
        })
    }

    /// Parse `adapter:database`, `adapter://database` or `sqlite::memory:`.
    pub fn from_url(url: &str) -> Result<Self> {
        let Some((adapter, rest)) = url.split_once(':') else {
            return Err(Error::config(
                ConfigErrorKind::AdapterNotFound,
                format!("connection url `{url}` names no adapter"),
            ));
        };
        if adapter.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::AdapterNotFound,
                format!("connection url `{url}` names no adapter"),
            ));
        }

        let database = match rest {
            MEMORY_DATABASE | "memory" | "//:memory:" => MEMORY_DATABASE,
            _ => rest.strip_prefix("//").unwrap_or(rest),
        };

        let config = Self::new(adapter);
        Ok(if database.is_empty() {
            config
        } else {
            config.database(database)
        })
    }

    /// Whether this config targets a private in-memory database.
    pub fn is_memory(&self) -> bool {
        self.database.as_deref().is_none_or(|db| db == MEMORY_DATABASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_memory() {
        let config = ConnectionConfig::from_url("sqlite::memory:").unwrap();
        assert_eq!(config.adapter.as_deref(), Some("sqlite"));
        assert!(config.is_memory());
    }

    #[test]
    fn test_from_url_path() {
        let config = ConnectionConfig::from_url("sqlite://db/app.sqlite3").unwrap();
        assert_eq!(config.database.as_deref(), Some("db/app.sqlite3"));
        assert!(!config.is_memory());

        let config = ConnectionConfig::from_url("sqlite:app.db").unwrap();
        assert_eq!(config.database.as_deref(), Some("app.db"));
    }

    #[test]
    fn test_from_url_without_adapter() {
        let err = ConnectionConfig::from_url("app.db").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::AdapterNotFound));
    }

    #[test]
    fn test_from_json_keeps_extra_options() {
        let config = ConnectionConfig::from_json(
            r#"{"adapter": "sqlite", "database": ":memory:", "busy_timeout": 500}"#,
        )
        .unwrap();
        assert_eq!(config.adapter.as_deref(), Some("sqlite"));
        assert_eq!(config.get_option("busy_timeout"), Some(&serde_json::json!(500)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = ConnectionConfig::from_json("[1, 2]").unwrap_err();
        assert!(err.is_config());
    }
}
