//! The storage backend contract.
//!
//! The mapping engine is polymorphic over any backend implementing
//! [`Connection`]. Drivers run every statement through [`instrument`], which
//! times it, logs it under the `sqlrecord::sql` target and wraps backend
//! failures into [`Error::Statement`] with the offending SQL attached.

use std::time::Instant;

use crate::column::Column;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// Tracing target for statement logs.
pub const SQL_LOG_TARGET: &str = "sqlrecord::sql";

/// A synchronous connection to a storage backend.
///
/// All statements use `?` positional placeholders; `params` are bound in
/// order. Implementations must accept the rich [`Value`] variants, typically
/// by lowering them with [`crate::column::storable`].
pub trait Connection {
    /// Short adapter name, e.g. `"sqlite"`.
    fn adapter_name(&self) -> &'static str;

    /// Run a query and return all rows.
    fn select_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a query and return the first row, if any.
    fn select_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.select_all(sql, params)?.into_iter().next())
    }

    /// Run a query and return the first column of the first row.
    fn select_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .select_one(sql, params)?
            .and_then(|row| row.get_index(0).cloned()))
    }

    /// Describe the columns of a table, in declaration order.
    fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Run an INSERT and return the generated row id, if the backend has one.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<i64>>;

    /// Run an UPDATE and return the number of affected rows.
    fn update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute(sql, params)
    }

    /// Run a DELETE and return the number of affected rows.
    fn delete(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute(sql, params)
    }

    /// Run any statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Open a transaction.
    fn begin_db_transaction(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit_db_transaction(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback_db_transaction(&self) -> Result<()>;

    /// Schema of the database in its native definition language.
    fn structure_dump(&self) -> Result<String>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn adapter_name(&self) -> &'static str {
        (**self).adapter_name()
    }

    fn select_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).select_all(sql, params)
    }

    fn select_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        (**self).select_one(sql, params)
    }

    fn select_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        (**self).select_value(sql, params)
    }

    fn columns(&self, table: &str) -> Result<Vec<Column>> {
        (**self).columns(table)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        (**self).insert(sql, params)
    }

    fn update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).update(sql, params)
    }

    fn delete(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).delete(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn begin_db_transaction(&self) -> Result<()> {
        (**self).begin_db_transaction()
    }

    fn commit_db_transaction(&self) -> Result<()> {
        (**self).commit_db_transaction()
    }

    fn rollback_db_transaction(&self) -> Result<()> {
        (**self).rollback_db_transaction()
    }

    fn structure_dump(&self) -> Result<String> {
        (**self).structure_dump()
    }
}

/// Run one backend statement with timing, logging and error wrapping.
///
/// `name` is a short label for the log line (e.g. `"Topic Load"`).
pub fn instrument<T, E, F>(sql: &str, name: &str, f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(value) => {
            tracing::debug!(
                target: SQL_LOG_TARGET,
                name = name,
                elapsed_ms = elapsed_ms,
                sql = sql,
                "statement"
            );
            Ok(value)
        }
        Err(e) => {
            tracing::warn!(
                target: SQL_LOG_TARGET,
                name = name,
                elapsed_ms = elapsed_ms,
                sql = sql,
                error = %e,
                "statement failed"
            );
            Err(Error::statement(sql, e))
        }
    }
}
