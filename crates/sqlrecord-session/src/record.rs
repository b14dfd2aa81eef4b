//! Records: instances of a model class.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use sqlrecord_core::{Error, Errors, Result, Row, Value};

use crate::class::ModelClass;

/// Attribute assignments, as produced by the [`attributes!`](crate::attributes) macro.
pub type Attributes = Vec<(String, Value)>;

static NULL: Value = Value::Null;

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not yet inserted.
    New,
    /// Backed by a row.
    Persisted,
    /// Deleted; the record is frozen.
    Destroyed,
}

/// Cached targets of one association.
#[derive(Debug, Clone)]
pub(crate) enum AssociationTarget {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

/// One instance of a [`ModelClass`].
///
/// Attributes are kept in column order and coerced through the column's type
/// on every write. Association targets and composed value objects are cached
/// per record; cloning a record clones its caches.
#[derive(Clone)]
pub struct Record {
    class: Arc<ModelClass>,
    attributes: IndexMap<String, Value>,
    original: IndexMap<String, Value>,
    state: RecordState,
    errors: Errors,
    pub(crate) aggregations: HashMap<String, Arc<dyn Any + Send + Sync>>,
    pub(crate) associations: HashMap<String, AssociationTarget>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("class", &self.class.name())
            .field("state", &self.state)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl Record {
    /// A new record with column defaults.
    pub(crate) fn blank(class: Arc<ModelClass>) -> Self {
        let attributes: IndexMap<String, Value> = class
            .columns()
            .map(|c| (c.name.clone(), c.default_value()))
            .collect();
        Self {
            class,
            original: IndexMap::new(),
            attributes,
            state: RecordState::New,
            errors: Errors::new(),
            aggregations: HashMap::new(),
            associations: HashMap::new(),
        }
    }

    /// A persisted record from a fetched row.
    ///
    /// Row columns the class does not know (join table columns, computed
    /// columns of custom SQL) are kept as they came from the backend.
    pub(crate) fn from_row(class: Arc<ModelClass>, row: Row) -> Self {
        let attributes: IndexMap<String, Value> = row
            .into_iter()
            .map(|(name, value)| {
                let value = match class.column(&name) {
                    Some(column) => column.type_cast(&value),
                    None => value,
                };
                (name, value)
            })
            .collect();
        Self {
            class,
            original: attributes.clone(),
            attributes,
            state: RecordState::Persisted,
            errors: Errors::new(),
            aggregations: HashMap::new(),
            associations: HashMap::new(),
        }
    }

    /// The record's class.
    pub fn class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    /// Primary key value; NULL until the record is saved.
    pub fn id(&self) -> Value {
        self.get(self.class.primary_key()).clone()
    }

    /// Attribute value; NULL when unset or unknown.
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Value the attribute had when the record was loaded or last saved.
    pub fn original(&self, name: &str) -> &Value {
        self.original.get(name).unwrap_or(&NULL)
    }

    /// Assign an attribute, coercing it through the column type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Frozen {
                model: self.class.name().to_string(),
            });
        }
        let value = value.into();
        let value = match self.class.column(name) {
            Some(column) => column.type_cast(&value),
            None if self.class.has_attribute(name) => value,
            None => {
                return Err(Error::UnknownAttribute {
                    model: self.class.name().to_string(),
                    attribute: name.to_string(),
                });
            }
        };
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Assign several attributes.
    pub fn set_attributes<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in attributes {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Write an attribute the backend already holds, so it is not reported
    /// as changed.
    pub(crate) fn write_clean(&mut self, name: &str, value: Value) {
        let value = match self.class.column(name) {
            Some(column) => column.type_cast(&value),
            None => value,
        };
        self.original.insert(name.to_string(), value.clone());
        self.attributes.insert(name.to_string(), value);
    }

    /// Attributes in column order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column values as stored by the backend, skipping virtual attributes.
    pub(crate) fn storage_values(&self) -> Vec<(String, Value)> {
        self.class
            .columns()
            .map(|column| (column.name.clone(), column.to_storage(self.get(&column.name))))
            .collect()
    }

    /// Columns whose value differs from the loaded one.
    pub fn changed(&self) -> Vec<&str> {
        self.class
            .column_names()
            .filter(|name| self.get(name) != self.original(name))
            .collect()
    }

    /// Validation messages from the last save.
    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// Mutable validation messages, for `validate` hooks.
    pub fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }

    /// Persistence state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Whether the record has not been saved yet.
    pub fn is_new_record(&self) -> bool {
        self.state == RecordState::New
    }

    /// Whether the record is backed by a row.
    pub fn is_persisted(&self) -> bool {
        self.state == RecordState::Persisted
    }

    /// Whether the record was destroyed (and is frozen).
    pub fn is_destroyed(&self) -> bool {
        self.state == RecordState::Destroyed
    }

    /// Whether `other` is the same row: same table and same non-NULL id.
    pub fn same_record(&self, other: &Record) -> bool {
        let id = self.id();
        !id.is_null()
            && id == other.id()
            && self.class.base_class().name() == other.class.base_class().name()
    }

    /// Whether the association's targets are cached.
    pub fn is_loaded(&self, association: &str) -> bool {
        self.associations.contains_key(association)
    }

    /// Forget every cached association target and value object.
    pub fn clear_caches(&mut self) {
        self.associations.clear();
        self.aggregations.clear();
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.state = RecordState::Persisted;
        self.original = self.attributes.clone();
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.state = RecordState::Destroyed;
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        let pk = self.class.primary_key().to_string();
        self.write_clean(&pk, Value::Int(id));
    }

    /// Take over the attributes of a freshly fetched copy.
    pub(crate) fn replace_attributes(&mut self, fresh: Record) {
        self.original = fresh.original;
        self.attributes = fresh.attributes;
        self.clear_caches();
    }
}
