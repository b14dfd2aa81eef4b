//! The session: connection, class registry, transactions and statement
//! plumbing shared by persistence, finders and associations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use sqlrecord_core::connection::SQL_LOG_TARGET;
use sqlrecord_core::{ConfigErrorKind, Connection, ConnectionConfig, Error, Result, Row, Value};
use sqlrecord_query::{Condition, DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};

use crate::callbacks::{CallbackEvent, Observer};
use crate::class::{INHERITANCE_COLUMN, ModelClass};
use crate::config::SessionConfig;
use crate::lazy_load::{LazyLoadStats, LazyLoadTracker};
use crate::provider::ConnectionProvider;
use crate::record::Record;

// ============================================================================
// Class references
// ============================================================================

/// Anything that names a registered class: its name or the class itself.
pub trait ClassRef {
    /// Resolve to the registered class.
    fn resolve(self, session: &Session) -> Result<Arc<ModelClass>>;
}

impl ClassRef for &str {
    fn resolve(self, session: &Session) -> Result<Arc<ModelClass>> {
        session.class(self)
    }
}

impl ClassRef for &String {
    fn resolve(self, session: &Session) -> Result<Arc<ModelClass>> {
        session.class(self)
    }
}

impl ClassRef for Arc<ModelClass> {
    fn resolve(self, _session: &Session) -> Result<Arc<ModelClass>> {
        Ok(self)
    }
}

impl ClassRef for &Arc<ModelClass> {
    fn resolve(self, _session: &Session) -> Result<Arc<ModelClass>> {
        Ok(Arc::clone(self))
    }
}

// ============================================================================
// Session
// ============================================================================

/// Entry point of the mapping engine.
///
/// A session owns the [`ConnectionProvider`], the registry of declared
/// classes and the transaction state. It is single-threaded: interior state
/// lives in `Cell`/`RefCell`, so a `Session` is neither `Sync` nor shared
/// between threads.
///
/// ```ignore
/// let mut session = Session::new();
/// session.register_adapter("sqlite", |config| {
///     Ok(Box::new(SqliteConnection::from_config(config)?) as Box<dyn Connection>)
/// });
/// session.establish_connection(ConnectionConfig::from_url("sqlite::memory:")?)?;
///
/// let topic = ModelBuilder::new("Topic").build(&session)?;
/// let mut first = session.create(&topic, attributes! { "title" => "The First Topic" })?;
/// ```
pub struct Session {
    provider: ConnectionProvider,
    config: SessionConfig,
    classes: RefCell<IndexMap<String, Arc<ModelClass>>>,
    observers: RefCell<Vec<(String, Arc<dyn Observer>)>>,
    transaction_depth: Cell<usize>,
    lazy_loads: RefCell<LazyLoadTracker>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("classes", &self.classes.borrow().keys().collect::<Vec<_>>())
            .field("transaction_depth", &self.transaction_depth.get())
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session with the default configuration and no adapters.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// A session with an explicit configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_provider(ConnectionProvider::new(), config)
    }

    /// A session over a prepared provider.
    pub fn with_provider(provider: ConnectionProvider, config: SessionConfig) -> Self {
        let tracker = LazyLoadTracker::new().with_threshold(config.lazy_load_threshold);
        Self {
            provider,
            config,
            classes: RefCell::new(IndexMap::new()),
            observers: RefCell::new(Vec::new()),
            transaction_depth: Cell::new(0),
            lazy_loads: RefCell::new(tracker),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// Register an adapter factory with the provider.
    pub fn register_adapter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectionConfig) -> Result<Box<dyn Connection>> + 'static,
    {
        self.provider.register_adapter(name, factory);
    }

    /// The connection provider.
    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    /// Open a connection through a registered adapter.
    pub fn establish_connection(&mut self, config: ConnectionConfig) -> Result<()> {
        self.provider.establish_connection(config)
    }

    /// Install an already opened connection.
    pub fn set_connection(&mut self, connection: Box<dyn Connection>) {
        self.provider.set_connection(connection);
    }

    /// Close the connection, returning its configuration.
    pub fn remove_connection(&mut self) -> Option<ConnectionConfig> {
        self.transaction_depth.set(0);
        self.provider.remove_connection()
    }

    /// The established connection.
    pub fn connection(&self) -> Result<&dyn Connection> {
        self.provider.connection()
    }

    /// Whether a connection is established.
    pub fn is_connected(&self) -> bool {
        self.provider.is_connected()
    }

    /// Schema of the connected database as SQL.
    pub fn structure_dump(&self) -> Result<String> {
        self.connection()?.structure_dump()
    }

    // ------------------------------------------------------------------------
    // Class registry
    // ------------------------------------------------------------------------

    /// Register a built class, replacing any class of the same name.
    pub(crate) fn register(&self, class: Arc<ModelClass>) {
        self.classes
            .borrow_mut()
            .insert(class.name().to_string(), class);
    }

    /// A registered class by name.
    pub fn class(&self, name: &str) -> Result<Arc<ModelClass>> {
        self.classes.borrow().get(name).cloned().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownClass,
                format!("class {name} is not defined"),
            )
        })
    }

    /// Every registered class, in registration order.
    pub fn classes(&self) -> Vec<Arc<ModelClass>> {
        self.classes.borrow().values().cloned().collect()
    }

    /// Registered classes that inherit from `class`, at any depth.
    pub fn descendants(&self, class: &ModelClass) -> Vec<Arc<ModelClass>> {
        self.classes
            .borrow()
            .values()
            .filter(|c| c.name() != class.name() && c.is_a(class.name()))
            .cloned()
            .collect()
    }

    /// SELECT over the class's table, restricted to the class and its
    /// descendants when the table is shared by an inheritance chain.
    pub fn select_for(&self, class: &ModelClass) -> SelectBuilder {
        SelectBuilder::from(class.table_name()).filter_opt(self.inheritance_scope(class))
    }

    /// `type IN (...)` over the class and its descendants; `None` unless the
    /// table is shared by an inheritance chain.
    pub(crate) fn inheritance_scope(&self, class: &ModelClass) -> Option<Condition> {
        if !class.uses_inheritance_column() {
            return None;
        }
        let names = std::iter::once(class.name().to_string())
            .chain(self.descendants(class).into_iter().map(|c| c.name().to_string()))
            .map(Value::Text);
        Some(Condition::in_list(INHERITANCE_COLUMN, names))
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Notify `observer` of lifecycle events of `class_name` and its
    /// subclasses.
    pub fn observe(&self, class_name: impl Into<String>, observer: Arc<dyn Observer>) {
        self.observers
            .borrow_mut()
            .push((class_name.into(), observer));
    }

    /// Observers registered for the class or one of its ancestors.
    pub(crate) fn observers_for(&self, class: &ModelClass) -> Vec<Arc<dyn Observer>> {
        self.observers
            .borrow()
            .iter()
            .filter(|(name, _)| class.is_a(name))
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Run `f` inside a transaction.
    ///
    /// Transactions nest: only the outermost call issues BEGIN and COMMIT.
    /// An error anywhere inside rolls the outermost transaction back once it
    /// reaches that scope.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T>,
    {
        let conn = self.connection()?;
        let depth = self.transaction_depth.get();
        if depth == 0 {
            conn.begin_db_transaction()?;
        }
        self.transaction_depth.set(depth + 1);
        let result = f(self);
        self.transaction_depth.set(depth);

        if depth > 0 {
            return result;
        }
        match result {
            Ok(value) => {
                if let Err(e) = conn.commit_db_transaction() {
                    rollback(conn);
                    return Err(e);
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rolling back transaction");
                rollback(conn);
                Err(e)
            }
        }
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction_depth.get() > 0
    }

    // ------------------------------------------------------------------------
    // Lazy-load tracking
    // ------------------------------------------------------------------------

    #[track_caller]
    pub(crate) fn record_lazy_load(&self, class: &ModelClass, association: &str) {
        self.lazy_loads
            .borrow_mut()
            .record_load(class.name(), association);
    }

    /// Lazy association loads so far.
    pub fn lazy_load_stats(&self) -> LazyLoadStats {
        self.lazy_loads.borrow().stats()
    }

    /// Reset lazy-load counters, e.g. at the start of a request.
    pub fn reset_lazy_loads(&self) {
        self.lazy_loads.borrow_mut().reset();
    }

    // ------------------------------------------------------------------------
    // Statement plumbing
    // ------------------------------------------------------------------------

    fn log(&self, class: &ModelClass, name: &str, sql: &str) {
        if self.config.log_statements {
            tracing::info!(target: SQL_LOG_TARGET, sql = sql, "{} {}", class.name(), name);
        }
    }

    pub(crate) fn select_rows(
        &self,
        class: &ModelClass,
        name: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>> {
        self.log(class, name, sql);
        self.connection()?.select_all(sql, params)
    }

    pub(crate) fn select_value(
        &self,
        class: &ModelClass,
        name: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Value>> {
        self.log(class, name, sql);
        self.connection()?.select_value(sql, params)
    }

    pub(crate) fn count_rows(&self, class: &ModelClass, select: &SelectBuilder) -> Result<i64> {
        let (sql, params) = select.build_count();
        Ok(self
            .select_value(class, "Count", &sql, &params)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    pub(crate) fn execute_insert(
        &self,
        class: &ModelClass,
        insert: &InsertBuilder,
    ) -> Result<Option<i64>> {
        let (sql, params) = insert.build();
        self.log(class, "Create", &sql);
        self.connection()?.insert(&sql, &params)
    }

    pub(crate) fn execute_update(
        &self,
        class: &ModelClass,
        name: &str,
        update: &UpdateBuilder,
    ) -> Result<u64> {
        let (sql, params) = update.build();
        if sql.is_empty() {
            return Ok(0);
        }
        self.log(class, name, &sql);
        self.connection()?.update(&sql, &params)
    }

    pub(crate) fn execute_delete(
        &self,
        class: &ModelClass,
        name: &str,
        delete: &DeleteBuilder,
    ) -> Result<u64> {
        let (sql, params) = delete.build();
        self.log(class, name, &sql);
        self.connection()?.delete(&sql, &params)
    }

    pub(crate) fn execute_sql(
        &self,
        class: &ModelClass,
        name: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.log(class, name, sql);
        self.connection()?.execute(sql, params)
    }

    // ------------------------------------------------------------------------
    // Instantiation
    // ------------------------------------------------------------------------

    /// A new, unsaved record with column defaults and `attributes` applied.
    pub fn new_record<K, V>(
        &self,
        class: impl ClassRef,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let class = class.resolve(self)?;
        let mut record = Record::blank(Arc::clone(&class));
        if class.uses_inheritance_column() {
            record.set(INHERITANCE_COLUMN, class.name())?;
        }
        record.set_attributes(attributes)?;
        self.fire(CallbackEvent::AfterInitialize, &mut record)?;
        Ok(record)
    }

    /// Materialize a fetched row, as the subclass named in its `type` column
    /// when the table is shared.
    pub(crate) fn instantiate(&self, class: &Arc<ModelClass>, row: Row) -> Result<Record> {
        let type_name = row
            .get(INHERITANCE_COLUMN)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty() && *name != class.name())
            .map(str::to_string);

        let class = match type_name {
            Some(name) if class.column(INHERITANCE_COLUMN).is_some() => {
                let subclass = self.class(&name).map_err(|_| {
                    Error::config(
                        ConfigErrorKind::UnknownClass,
                        format!(
                            "the single-table inheritance row of {} names unknown subclass {name}",
                            class.name()
                        ),
                    )
                })?;
                if subclass.table_name() == class.table_name() {
                    subclass
                } else {
                    Arc::clone(class)
                }
            }
            _ => Arc::clone(class),
        };

        let mut record = Record::from_row(class, row);
        self.fire(CallbackEvent::AfterFind, &mut record)?;
        self.fire(CallbackEvent::AfterInitialize, &mut record)?;
        Ok(record)
    }

    pub(crate) fn instantiate_all(&self, class: &Arc<ModelClass>, rows: Vec<Row>) -> Result<Vec<Record>> {
        rows.into_iter()
            .map(|row| self.instantiate(class, row))
            .collect()
    }

    /// Run a SELECT and materialize every row.
    pub(crate) fn load(
        &self,
        class: &Arc<ModelClass>,
        select: &SelectBuilder,
    ) -> Result<Vec<Record>> {
        let (sql, params) = select.build();
        let rows = self.select_rows(class, "Load", &sql, &params)?;
        self.instantiate_all(class, rows)
    }
}

fn rollback(conn: &dyn Connection) {
    if let Err(e) = conn.rollback_db_transaction() {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ModelBuilder;
    use sqlrecord_sqlite::SqliteConnection;

    fn session() -> Session {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE topics (id INTEGER PRIMARY KEY, title VARCHAR(255), type VARCHAR(255));",
        )
        .unwrap();
        let mut session = Session::new();
        session.set_connection(Box::new(conn));
        session
    }

    #[test]
    fn test_connection_not_established() {
        let session = Session::new();
        let err = session.connection().err().unwrap();
        assert_eq!(
            err.config_kind(),
            Some(ConfigErrorKind::ConnectionNotEstablished)
        );
        let err = ModelBuilder::new("Topic").build(&session).unwrap_err();
        assert_eq!(
            err.config_kind(),
            Some(ConfigErrorKind::ConnectionNotEstablished)
        );
    }

    #[test]
    fn test_unknown_class() {
        let session = session();
        let err = session.class("Ghost").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownClass));
    }

    #[test]
    fn test_select_for_scopes_subclasses() {
        let session = session();
        let topic = ModelBuilder::new("Topic").build(&session).unwrap();
        let reply = ModelBuilder::new("Reply")
            .inherits(&topic)
            .build(&session)
            .unwrap();
        ModelBuilder::new("SillyReply")
            .inherits(&reply)
            .build(&session)
            .unwrap();

        let (sql, _) = session.select_for(&topic).build();
        assert_eq!(sql, "SELECT * FROM topics");

        let (sql, params) = session.select_for(&reply).build();
        assert_eq!(sql, "SELECT * FROM topics WHERE type IN (?, ?)");
        assert_eq!(params, vec![Value::from("Reply"), Value::from("SillyReply")]);
    }

    #[test]
    fn test_nested_transactions_commit_once() {
        let session = session();
        let depth = session
            .transaction(|s| s.transaction(|s| Ok(s.transaction_depth.get())))
            .unwrap();
        assert_eq!(depth, 2);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_inner_failure_rolls_back_outer() {
        let session = session();
        let topic = ModelBuilder::new("Topic").build(&session).unwrap();
        let result: Result<()> = session.transaction(|s| {
            s.execute_sql(
                &topic,
                "Insert",
                "INSERT INTO topics (title) VALUES ('kept?')",
                &[],
            )?;
            s.transaction(|_| Err(Error::aborted("inner")))
        });
        assert!(result.unwrap_err().is_aborted());

        let count = session
            .connection()
            .unwrap()
            .select_value("SELECT COUNT(*) FROM topics", &[])
            .unwrap();
        assert_eq!(count, Some(Value::Int(0)));
    }
}
