//! SQLite driver for SQLRecord.
//!
//! [`SqliteConnection`] implements [`Connection`] over a `rusqlite`
//! connection. Every statement is run through
//! [`sqlrecord_core::instrument`], so it is timed and logged under the
//! `sqlrecord::sql` target and failures carry the SQL that caused them.
//!
//! ```
//! use sqlrecord_core::Connection;
//! use sqlrecord_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_batch("CREATE TABLE topics (id INTEGER PRIMARY KEY, title VARCHAR(255))")
//!     .unwrap();
//! let id = conn
//!     .insert("INSERT INTO topics (title) VALUES (?)", &["Hello".into()])
//!     .unwrap();
//! assert_eq!(id, Some(1));
//! ```

mod value;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection as RusqliteConnection, params_from_iter};
use sqlrecord_core::config::MEMORY_DATABASE;
use sqlrecord_core::{
    Column, ConfigErrorKind, Connection, ConnectionConfig, Error, Result, Row, Value, instrument,
    quote_ident,
};

use crate::value::{Param, from_sql, parse_default};

/// Adapter name used in connection configurations.
pub const ADAPTER_NAME: &str = "sqlite";

/// A connection to a SQLite database.
#[derive(Debug)]
pub struct SqliteConnection {
    connection: RusqliteConnection,
}

impl SqliteConnection {
    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        let connection = instrument(MEMORY_DATABASE, "Open", RusqliteConnection::open_in_memory)?;
        Ok(Self { connection })
    }

    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let label = path.as_ref().display().to_string();
        let connection = instrument(&label, "Open", || RusqliteConnection::open(path))?;
        Ok(Self { connection })
    }

    /// Open the database named by a configuration.
    ///
    /// Recognized options: `busy_timeout` (milliseconds) and `foreign_keys`
    /// (boolean).
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        match config.adapter.as_deref() {
            Some(ADAPTER_NAME) => {}
            other => {
                return Err(Error::config(
                    ConfigErrorKind::AdapterNotFound,
                    format!("sqlite driver cannot open adapter {other:?}"),
                ));
            }
        }

        let conn = if config.is_memory() {
            Self::open_memory()?
        } else {
            Self::open(config.database.as_deref().unwrap_or(MEMORY_DATABASE))?
        };

        if let Some(ms) = config.get_option("busy_timeout").and_then(|v| v.as_u64()) {
            let timeout = Duration::from_millis(ms);
            instrument("busy_timeout", "Configure", || {
                conn.connection.busy_timeout(timeout)
            })?;
        }
        if let Some(on) = config.get_option("foreign_keys").and_then(|v| v.as_bool()) {
            let pragma = format!("PRAGMA foreign_keys = {}", if on { "ON" } else { "OFF" });
            conn.execute_batch(&pragma)?;
        }

        tracing::debug!(database = ?config.database, "Opened sqlite connection");
        Ok(conn)
    }

    /// Run one or more statements without parameters, e.g. a schema script.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        instrument(sql, "Batch", || self.connection.execute_batch(sql))
    }

    /// The underlying `rusqlite` connection.
    pub fn raw(&self) -> &RusqliteConnection {
        &self.connection
    }

    fn run(&self, sql: &str, params: &[Value], name: &str) -> Result<u64> {
        instrument(sql, name, || {
            let mut stmt = self.connection.prepare_cached(sql)?;
            let changed = stmt.execute(params_from_iter(params.iter().map(Param)))?;
            Ok::<_, rusqlite::Error>(changed as u64)
        })
    }

    fn transaction_statement(&self, sql: &str) -> Result<()> {
        instrument(sql, "Transaction", || self.connection.execute_batch(sql))
    }
}

impl Connection for SqliteConnection {
    fn adapter_name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn select_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        instrument(sql, "Select", || {
            let mut stmt = self.connection.prepare_cached(sql)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query(params_from_iter(params.iter().map(Param)))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (index, name) in names.iter().enumerate() {
                    record.push(name.clone(), from_sql(row.get_ref(index)?));
                }
                out.push(record);
            }
            Ok::<_, rusqlite::Error>(out)
        })
    }

    fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = self.select_all(&sql, &[])?;

        Ok(rows
            .iter()
            .map(|row| {
                let text = |key: &str| row.get(key).and_then(Value::as_str).unwrap_or_default();
                let flag = |key: &str| row.get(key).and_then(Value::as_i64).unwrap_or(0);

                Column::new(text("name"), text("type"))
                    .default(parse_default(row.get("dflt_value").and_then(Value::as_str)))
                    .nullable(flag("notnull") == 0)
                    .primary(flag("pk") > 0)
            })
            .collect())
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        self.run(sql, params, "Insert")?;
        Ok(Some(self.connection.last_insert_rowid()))
    }

    fn update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params, "Update")
    }

    fn delete(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params, "Delete")
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params, "Execute")
    }

    fn begin_db_transaction(&self) -> Result<()> {
        self.transaction_statement("BEGIN")
    }

    fn commit_db_transaction(&self) -> Result<()> {
        self.transaction_statement("COMMIT")
    }

    fn rollback_db_transaction(&self) -> Result<()> {
        self.transaction_statement("ROLLBACK")
    }

    fn structure_dump(&self) -> Result<String> {
        let rows = self.select_all(
            "SELECT sql FROM sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
            &[],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("sql").and_then(Value::as_str))
            .map(|sql| format!("{sql};\n\n"))
            .collect())
    }
}
