//! SQLRecord: active-record style object-relational mapping for Rust.
//!
//! This facade re-exports the workspace crates and wires the bundled SQLite
//! backend into a ready-to-use [`Session`].
//!
//! ```ignore
//! use sqlrecord::prelude::*;
//!
//! let session = sqlrecord::memory_session(
//!     "CREATE TABLE topics (id INTEGER PRIMARY KEY, title VARCHAR(255), \
//!      replies_count INTEGER DEFAULT 0)",
//! )?;
//! let topic = ModelBuilder::new("Topic").build(&session)?;
//! let first = session.create_strict(&topic, attributes! { "title" => "The First Topic" })?;
//! assert_eq!(first.get("replies_count"), &Value::Int(0));
//! ```
//!
//! Statements are logged through `tracing` with the target
//! [`SQL_LOG_TARGET`]; repeated lazy association loads are reported with the
//! target [`LAZY_LOAD_TARGET`].

pub use sqlrecord_core::connection::{SQL_LOG_TARGET, instrument};
pub use sqlrecord_core::{
    Column, ConfigError, ConfigErrorKind, Connection, ConnectionConfig, Error, Errors,
    NotFoundError, Result, Row, SqlType, StatementError, ValidationFailed, Value, inflector,
    quote_ident,
};
pub use sqlrecord_query::{
    Condition, DeleteBuilder, InsertBuilder, QueryBuilder, SelectBuilder, UpdateBuilder, Where,
};
pub use sqlrecord_session::{
    Association, AssociationKind, Attributes, BelongsTo, BelongsToOptions, CallSite, Callback,
    CallbackChain, CallbackEvent, CallbackFn, ClassRef, Composition, CompositionOptions,
    ConnectionProvider, CounterCache, FindOptions, HabtmOptions, HasAndBelongsToMany, HasMany,
    HasManyOptions, HasOne, HasOneOptions, INHERITANCE_COLUMN, LAZY_LOAD_TARGET, LazyLoadStats,
    LifecycleHooks, ModelBuilder, ModelClass, Observer, PrimaryKeyPrefix, Record, RecordState,
    Session, SessionConfig, Validation, ValidationContext, ValueObject, attributes,
};
pub use sqlrecord_sqlite::SqliteConnection;

/// Association and composition options are JSON objects.
pub use serde_json::json;

/// Common imports.
pub mod prelude {
    pub use crate::{
        Callback, CallbackEvent, Condition, ConfigErrorKind, Connection, ConnectionConfig,
        Error, FindOptions, LifecycleHooks, ModelBuilder, ModelClass, Observer, Record, Result,
        Session, SessionConfig, SqliteConnection, Validation, ValidationContext, Value,
        ValueObject, attributes, json,
    };
}

/// Register the bundled adapters with `session`.
pub fn register_default_adapters(session: &mut Session) {
    session.register_adapter(sqlrecord_sqlite::ADAPTER_NAME, |config| {
        Ok(Box::new(SqliteConnection::from_config(config)?) as Box<dyn Connection>)
    });
}

/// A session that knows the bundled adapters, not yet connected.
pub fn session(config: SessionConfig) -> Session {
    let mut session = Session::with_config(config);
    register_default_adapters(&mut session);
    session
}

/// A session connected according to `url`, e.g. `sqlite::memory:` or
/// `sqlite://db/development.sqlite3`.
pub fn connect(url: &str) -> Result<Session> {
    let mut session = session(SessionConfig::default());
    session.establish_connection(ConnectionConfig::from_url(url)?)?;
    Ok(session)
}

/// A session over a fresh in-memory SQLite database with `schema` applied.
pub fn memory_session(schema: &str) -> Result<Session> {
    memory_session_with(schema, SessionConfig::default())
}

/// Like [`memory_session`], with an explicit configuration.
pub fn memory_session_with(schema: &str, config: SessionConfig) -> Result<Session> {
    let conn = SqliteConnection::open_memory()?;
    conn.execute_batch(schema)?;
    let mut session = session(config);
    session.set_connection(Box::new(conn));
    tracing::debug!("In-memory session ready");
    Ok(session)
}
