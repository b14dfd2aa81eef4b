//! SQL statement builders for SQLRecord.
//!
//! `sqlrecord-query` turns table names, column values and conditions into
//! `(sql, params)` pairs with `?` placeholders. The session crate uses it for
//! every statement it issues on behalf of model classes; applications can use
//! it directly for hand-written queries.

pub mod builder;
pub mod clause;

pub use builder::{DeleteBuilder, InsertBuilder, QueryBuilder, SelectBuilder, UpdateBuilder};
pub use clause::{Condition, Where};

