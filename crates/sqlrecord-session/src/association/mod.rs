//! Associations between model classes.
//!
//! An [`Association`] is declared once on a class through `ModelBuilder` and
//! never changes afterwards. Each declaration validates its options against a
//! fixed allow-list: the options are deserialized into a typed struct with
//! unknown fields denied, so a misspelled key fails at class definition.
//!
//! Per-record access goes through handles borrowed from the [`Session`]:
//! [`BelongsTo`], [`HasOne`], [`HasMany`] and [`HasAndBelongsToMany`]. They
//! load lazily into the owning record's association cache and keep that cache,
//! the foreign keys, join rows and counter caches consistent on every
//! mutation.

mod belongs_to;
pub(crate) mod habtm;
pub(crate) mod has_many;
pub(crate) mod has_one;

pub use belongs_to::BelongsTo;
pub use habtm::HasAndBelongsToMany;
pub use has_many::HasMany;
pub use has_one::HasOne;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use sqlrecord_core::{ConfigErrorKind, Error, Result, Value, inflector};
use sqlrecord_query::{Condition, SelectBuilder, UpdateBuilder};

use crate::class::ModelClass;
use crate::record::Record;
use crate::session::Session;

/// Kind of relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// Many-to-one; the foreign key lives on the owner.
    BelongsTo,
    /// One-to-one; the foreign key lives on the target.
    HasOne,
    /// One-to-many; the foreign key lives on the targets.
    HasMany,
    /// Many-to-many through a join table.
    HasAndBelongsToMany,
}

impl AssociationKind {
    /// Declaration name, e.g. `has_many`.
    pub const fn as_str(self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongs_to",
            AssociationKind::HasOne => "has_one",
            AssociationKind::HasMany => "has_many",
            AssociationKind::HasAndBelongsToMany => "has_and_belongs_to_many",
        }
    }

    /// Whether the association holds a collection.
    pub const fn is_collection(self) -> bool {
        matches!(
            self,
            AssociationKind::HasMany | AssociationKind::HasAndBelongsToMany
        )
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A counter cache option: `true` for the default column name, or a column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CounterCache {
    /// Enabled (default column) or disabled.
    Enabled(bool),
    /// Explicit column name.
    Column(String),
}

impl CounterCache {
    fn column(option: Option<&CounterCache>, default: impl FnOnce() -> String) -> Option<String> {
        match option? {
            CounterCache::Enabled(false) => None,
            CounterCache::Enabled(true) => Some(default()),
            CounterCache::Column(column) => Some(column.clone()),
        }
    }
}

/// Options accepted by `belongs_to`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BelongsToOptions {
    pub class_name: Option<String>,
    pub foreign_key: Option<String>,
    pub conditions: Option<String>,
    pub counter_cache: Option<CounterCache>,
}

/// Options accepted by `has_one`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HasOneOptions {
    pub class_name: Option<String>,
    pub foreign_key: Option<String>,
    pub conditions: Option<String>,
    pub order: Option<String>,
    #[serde(default)]
    pub dependent: bool,
}

/// Options accepted by `has_many`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HasManyOptions {
    pub class_name: Option<String>,
    pub foreign_key: Option<String>,
    pub conditions: Option<String>,
    pub order: Option<String>,
    #[serde(default)]
    pub dependent: bool,
    #[serde(default)]
    pub exclusively_dependent: bool,
    pub finder_sql: Option<String>,
    pub counter_sql: Option<String>,
    pub counter_cache: Option<CounterCache>,
}

/// Options accepted by `has_and_belongs_to_many`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HabtmOptions {
    pub class_name: Option<String>,
    pub join_table: Option<String>,
    pub foreign_key: Option<String>,
    pub association_foreign_key: Option<String>,
    pub conditions: Option<String>,
    pub order: Option<String>,
    pub finder_sql: Option<String>,
    pub delete_sql: Option<String>,
    pub insert_sql: Option<String>,
    pub counter_cache: Option<CounterCache>,
    pub association_counter_cache: Option<CounterCache>,
}

/// Deserialize declaration options, mapping unknown keys to
/// [`ConfigErrorKind::UnknownOption`].
pub(crate) fn parse_options<T: DeserializeOwned>(
    declaration: &str,
    name: &str,
    options: serde_json::Value,
) -> Result<T> {
    let options = match options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(options).map_err(|e| {
        let message = e.to_string();
        let kind = if message.starts_with("unknown field") {
            ConfigErrorKind::UnknownOption
        } else {
            ConfigErrorKind::InvalidDeclaration
        };
        Error::config(kind, format!("{declaration} :{name}: {message}"))
    })
}

/// An association declared on a class.
#[derive(Debug, Clone)]
pub struct Association {
    kind: AssociationKind,
    name: String,
    owner: String,
    class_name: String,
    foreign_key: String,
    association_foreign_key: Option<String>,
    join_table: Option<String>,
    conditions: Option<String>,
    order: Option<String>,
    finder_sql: Option<String>,
    counter_sql: Option<String>,
    delete_sql: Option<String>,
    insert_sql: Option<String>,
    dependent: bool,
    exclusively_dependent: bool,
    counter_cache: Option<CounterCache>,
    association_counter_cache: Option<CounterCache>,
}

impl Association {
    fn base(kind: AssociationKind, owner: &str, name: &str, class_name: String) -> Self {
        Self {
            kind,
            name: name.to_string(),
            owner: owner.to_string(),
            class_name,
            foreign_key: inflector::foreign_key(owner),
            association_foreign_key: None,
            join_table: None,
            conditions: None,
            order: None,
            finder_sql: None,
            counter_sql: None,
            delete_sql: None,
            insert_sql: None,
            dependent: false,
            exclusively_dependent: false,
            counter_cache: None,
            association_counter_cache: None,
        }
    }

    pub(crate) fn belongs_to(owner: &str, name: &str, options: BelongsToOptions) -> Self {
        let class_name = options
            .class_name
            .unwrap_or_else(|| inflector::camelize(name));
        Self {
            foreign_key: options
                .foreign_key
                .unwrap_or_else(|| format!("{name}_id")),
            conditions: options.conditions,
            counter_cache: options.counter_cache,
            ..Self::base(AssociationKind::BelongsTo, owner, name, class_name)
        }
    }

    pub(crate) fn has_one(owner: &str, name: &str, options: HasOneOptions) -> Self {
        let class_name = options
            .class_name
            .unwrap_or_else(|| inflector::camelize(name));
        let base = Self::base(AssociationKind::HasOne, owner, name, class_name);
        Self {
            foreign_key: options.foreign_key.unwrap_or(base.foreign_key.clone()),
            conditions: options.conditions,
            order: options.order,
            dependent: options.dependent,
            ..base
        }
    }

    pub(crate) fn has_many(owner: &str, name: &str, options: HasManyOptions) -> Result<Self> {
        if options.dependent && options.exclusively_dependent {
            return Err(Error::config(
                ConfigErrorKind::InvalidDeclaration,
                format!(
                    "has_many :{name}: the dependent and exclusively_dependent options are mutually exclusive"
                ),
            ));
        }
        let class_name = options
            .class_name
            .unwrap_or_else(|| inflector::classify(name));
        let base = Self::base(AssociationKind::HasMany, owner, name, class_name);
        Ok(Self {
            foreign_key: options.foreign_key.unwrap_or(base.foreign_key.clone()),
            conditions: options.conditions,
            order: options.order,
            dependent: options.dependent,
            exclusively_dependent: options.exclusively_dependent,
            finder_sql: options.finder_sql,
            counter_sql: options.counter_sql,
            counter_cache: options.counter_cache,
            ..base
        })
    }

    pub(crate) fn has_and_belongs_to_many(owner: &str, name: &str, options: HabtmOptions) -> Self {
        let class_name = options
            .class_name
            .unwrap_or_else(|| inflector::classify(name));
        let association_foreign_key = options
            .association_foreign_key
            .unwrap_or_else(|| inflector::foreign_key(&class_name));
        let base = Self::base(
            AssociationKind::HasAndBelongsToMany,
            owner,
            name,
            class_name,
        );
        Self {
            foreign_key: options.foreign_key.unwrap_or(base.foreign_key.clone()),
            association_foreign_key: Some(association_foreign_key),
            join_table: options.join_table,
            conditions: options.conditions,
            order: options.order,
            finder_sql: options.finder_sql,
            delete_sql: options.delete_sql,
            insert_sql: options.insert_sql,
            counter_cache: options.counter_cache,
            association_counter_cache: options.association_counter_cache,
            ..base
        }
    }

    /// Relationship kind.
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Association name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the declaring class.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name of the target class.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Foreign key column: on the owner for `belongs_to`, on the target for
    /// `has_one`/`has_many`, in the join table for habtm.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Join table column referencing the target (habtm only).
    pub fn association_foreign_key(&self) -> Option<&str> {
        self.association_foreign_key.as_deref()
    }

    /// Extra SQL conditions.
    pub fn conditions(&self) -> Option<&str> {
        self.conditions.as_deref()
    }

    /// ORDER BY fragment.
    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    /// Custom loading SQL.
    pub fn finder_sql(&self) -> Option<&str> {
        self.finder_sql.as_deref()
    }

    /// Custom counting SQL.
    pub fn counter_sql(&self) -> Option<&str> {
        self.counter_sql.as_deref()
    }

    /// Whether destroying the owner destroys the targets (callbacks run).
    pub fn is_dependent(&self) -> bool {
        self.dependent
    }

    /// Whether destroying the owner deletes the targets with one statement.
    pub fn is_exclusively_dependent(&self) -> bool {
        self.exclusively_dependent
    }

    /// Join table name: explicit, or both table names sorted and joined by `_`.
    pub fn join_table(&self, owner: &ModelClass, target: &ModelClass) -> String {
        if let Some(table) = &self.join_table {
            return table.clone();
        }
        let mut tables = [owner.table_name(), target.table_name()];
        tables.sort_unstable();
        tables.join("_")
    }

    /// Counter column on the owner (`has_many`, habtm).
    pub fn counter_cache_column(&self) -> Option<String> {
        CounterCache::column(self.counter_cache.as_ref(), || {
            format!("{}_count", self.name)
        })
    }

    /// Counter column on the parent of a `belongs_to`, named after the
    /// declaring class's table by default.
    pub fn parent_counter_column(&self, child: &ModelClass) -> Option<String> {
        CounterCache::column(self.counter_cache.as_ref(), || {
            format!("{}_count", child.collection_name())
        })
    }

    /// Counter column on habtm targets, named after the owner's table.
    pub fn association_counter_cache_column(&self, owner: &ModelClass) -> Option<String> {
        CounterCache::column(self.association_counter_cache.as_ref(), || {
            format!("{}_count", owner.collection_name())
        })
    }

    /// Custom join-row insert SQL.
    pub fn insert_sql(&self) -> Option<&str> {
        self.insert_sql.as_deref()
    }

    /// Custom join-row delete SQL.
    pub fn delete_sql(&self) -> Option<&str> {
        self.delete_sql.as_deref()
    }

    pub(crate) fn conditions_clause(&self) -> Option<Condition> {
        self.conditions.as_deref().map(Condition::from)
    }

    /// Select the targets whose foreign key points at `owner_id`.
    pub(crate) fn scoped_select(
        &self,
        session: &Session,
        target: &ModelClass,
        owner_id: &Value,
    ) -> SelectBuilder {
        session
            .select_for(target)
            .filter(Condition::eq(&self.foreign_key, owner_id.clone()))
            .filter_opt(self.conditions_clause())
            .order_by(self.order.clone().unwrap_or_default())
    }
}

/// Bind `value` to every `?` in a custom association SQL string.
pub(crate) fn bind_all(sql: &str, value: &Value) -> Vec<Value> {
    vec![value.clone(); sql.matches('?').count()]
}

/// Rewrite a counter column of one row from a subquery and return the new
/// value.
pub(crate) fn recount(
    session: &Session,
    class: &ModelClass,
    id: &Value,
    column: &str,
    count_sql: &str,
    params: Vec<Value>,
) -> Result<Value> {
    let update = UpdateBuilder::table(class.table_name())
        .set_raw_with(format!("{column} = ({count_sql})"), params)
        .filter(Condition::eq(class.primary_key(), id.clone()));
    session.execute_update(class, "Update Counter", &update)?;

    let (sql, params) = SelectBuilder::from(class.table_name())
        .columns(&[column])
        .filter(Condition::eq(class.primary_key(), id.clone()))
        .build();
    Ok(session
        .select_value(class, "Counter", &sql, &params)?
        .unwrap_or(Value::Int(0)))
}

/// Rewrite a counter column from a subquery and mirror it into `record`.
pub(crate) fn refresh_counter(
    session: &Session,
    record: &mut Record,
    column: &str,
    count_sql: &str,
    params: Vec<Value>,
) -> Result<()> {
    let class = Arc::clone(record.class());
    let id = record.id();
    if id.is_null() {
        return Ok(());
    }
    let value = recount(session, &class, &id, column, count_sql, params)?;
    record.write_clean(column, value);
    Ok(())
}

/// Resolve an owner association of the expected kind plus its target class.
pub(crate) fn resolve(
    session: &Session,
    owner: &Record,
    name: &str,
    kind: AssociationKind,
) -> Result<(Arc<Association>, Arc<ModelClass>)> {
    let association = owner
        .class()
        .association(name)
        .filter(|a| a.kind() == kind)
        .ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownAssociation,
                format!("{} has no {kind} association named {name}", owner.class().name()),
            )
        })?;
    let target = session.class(association.class_name())?;
    Ok((association, target))
}

/// Reject records that are not instances of the association's class.
pub(crate) fn check_type(
    association: &Association,
    target: &ModelClass,
    record: &Record,
) -> Result<()> {
    if record.class().is_a(target.name()) {
        Ok(())
    } else {
        Err(Error::association(format!(
            "{} expected, got {} (association {})",
            target.name(),
            record.class().name(),
            association.name()
        )))
    }
}
