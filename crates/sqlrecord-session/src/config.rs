//! Session configuration.

use serde::{Deserialize, Serialize};
use sqlrecord_core::{ConfigErrorKind, Error, Result};

/// How default primary key names are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyPrefix {
    /// `id`
    #[default]
    None,
    /// `topicid`
    TableName,
    /// `topic_id`
    TableNameWithUnderscore,
}

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Log every statement the session issues at info level, labelled with
    /// the class and operation (e.g. `Topic Load`).
    pub log_statements: bool,
    /// Number of lazy loads of one association before a warning is logged.
    /// Zero disables tracking.
    pub lazy_load_threshold: usize,
    /// Whether default table names are pluralized (`Topic` → `topics`).
    pub pluralize_table_names: bool,
    /// Prepended to every default table name.
    pub table_name_prefix: String,
    /// Appended to every default table name.
    pub table_name_suffix: String,
    /// Default primary key naming.
    pub primary_key_prefix: PrimaryKeyPrefix,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_statements: false,
            lazy_load_threshold: 3,
            pluralize_table_names: true,
            table_name_prefix: String::new(),
            table_name_suffix: String::new(),
            primary_key_prefix: PrimaryKeyPrefix::None,
        }
    }
}

impl SessionConfig {
    /// Parse from a JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::config(
                ConfigErrorKind::InvalidDeclaration,
                format!("invalid session configuration: {e}"),
            )
        })
    }
}
