//! Core types and traits for SQLRecord.
//!
//! `sqlrecord-core` is the **foundation layer** of the workspace. It defines
//! the data types and the backend contract that every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Connection`] is implemented by storage drivers; the
//!   mapping engine is polymorphic over it.
//! - **Data model**: [`Value`], [`Row`] and [`SqlType`] carry query inputs and
//!   outputs between records, the query builders and drivers.
//! - **Column metadata**: [`Column`] owns the coercion rules between stored
//!   and in-memory values. Coercion never fails.
//! - **Errors**: a single [`Error`] type for configuration, statement,
//!   not-found, validation and callback-abort failures.
//!
//! # Who Uses This Crate
//!
//! - `sqlrecord-query` builds SQL over [`Value`] parameters.
//! - `sqlrecord-sqlite` implements [`Connection`].
//! - `sqlrecord-session` declares model classes over [`Column`]s and persists
//!   records through a [`Connection`].
//!
//! Most applications should use the `sqlrecord` facade; reach for
//! `sqlrecord-core` directly when writing drivers.

pub mod column;
pub mod config;
pub mod connection;
pub mod error;
pub mod identifiers;
pub mod inflector;
pub mod row;
pub mod types;
pub mod validate;
pub mod value;

pub use column::Column;
pub use config::ConnectionConfig;
pub use connection::{Connection, instrument};
pub use error::{
    ConfigError, ConfigErrorKind, Error, NotFoundError, Result, StatementError, ValidationFailed,
};
pub use identifiers::quote_ident;
pub use row::Row;
pub use types::SqlType;
pub use validate::Errors;
pub use value::Value;
