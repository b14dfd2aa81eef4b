//! Value-object composition.
//!
//! A class can compose one or more of its columns into an immutable value
//! object: `composed_of::<Money>("balance", json!({"mapping": [["balance",
//! "amount"]]}))` makes `record.aggregate::<Money>("balance")` build a
//! `Money` from the `balance` column, and `record.set_aggregate` write one
//! back.
//!
//! Value objects are handed out as `Arc<T>` and cached on the record, so
//! every handle is shared and `Arc::get_mut` never succeeds: the record can
//! only observe a new value through [`Record::set_aggregate`]. Equality is by
//! value (`PartialEq` on `T`), never by identity.

use std::any::{Any, TypeId};
use std::sync::Arc;

use serde::Deserialize;
use sqlrecord_core::{ConfigErrorKind, Error, Result, Value};

use crate::association::parse_options;
use crate::record::Record;

/// An immutable domain value composed from record columns.
pub trait ValueObject: Any + Send + Sync {
    /// Build the value from the mapped column values, in mapping order.
    fn compose(values: Vec<Value>) -> Self
    where
        Self: Sized;

    /// Read one mapped attribute back for writing into its column.
    fn attribute(&self, name: &str) -> Value;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Mapping {
    Pair(String, String),
    List(Vec<(String, String)>),
}

/// Options accepted by `composed_of`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositionOptions {
    /// Name of the value type; must match the Rust type when given.
    pub class_name: Option<String>,
    #[serde(default)]
    mapping: Option<Mapping>,
}

impl CompositionOptions {
    /// Options with an explicit mapping of `(column, attribute)` pairs.
    pub fn mapping<C, A>(pairs: impl IntoIterator<Item = (C, A)>) -> Self
    where
        C: Into<String>,
        A: Into<String>,
    {
        Self {
            class_name: None,
            mapping: Some(Mapping::List(
                pairs
                    .into_iter()
                    .map(|(c, a)| (c.into(), a.into()))
                    .collect(),
            )),
        }
    }
}

/// A declared composition.
#[derive(Debug, Clone)]
pub struct Composition {
    part: String,
    type_id: TypeId,
    type_name: &'static str,
    mapping: Vec<(String, String)>,
}

impl Composition {
    pub(crate) fn from_json<T: ValueObject>(part: &str, options: serde_json::Value) -> Result<Self> {
        let options: CompositionOptions = parse_options("composed_of", part, options)?;
        Self::new::<T>(part, options)
    }

    pub(crate) fn new<T: ValueObject>(part: &str, options: CompositionOptions) -> Result<Self> {
        let type_name = short_type_name::<T>();
        if let Some(class_name) = &options.class_name {
            if class_name != type_name {
                return Err(Error::config(
                    ConfigErrorKind::InvalidDeclaration,
                    format!("composed_of :{part}: class_name {class_name} does not match {type_name}"),
                ));
            }
        }

        let mapping = match options.mapping {
            None => vec![(part.to_string(), part.to_string())],
            Some(Mapping::Pair(column, attribute)) => vec![(column, attribute)],
            Some(Mapping::List(pairs)) if pairs.is_empty() => {
                return Err(Error::config(
                    ConfigErrorKind::InvalidDeclaration,
                    format!("composed_of :{part}: mapping is empty"),
                ));
            }
            Some(Mapping::List(pairs)) => pairs,
        };

        Ok(Self {
            part: part.to_string(),
            type_id: TypeId::of::<T>(),
            type_name,
            mapping,
        })
    }

    /// Name of the composed part.
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Short name of the value type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `(column, attribute)` pairs in declaration order.
    pub fn mapping(&self) -> &[(String, String)] {
        &self.mapping
    }

    fn check_type<T: ValueObject>(&self) -> Result<()> {
        if self.type_id == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(Error::config(
                ConfigErrorKind::TypeMismatch,
                format!(
                    "{} is composed of {}, not {}",
                    self.part,
                    self.type_name,
                    short_type_name::<T>()
                ),
            ))
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl Record {
    fn composition(&self, part: &str) -> Result<Composition> {
        self.class()
            .composition(part)
            .cloned()
            .ok_or_else(|| Error::UnknownAttribute {
                model: self.class().name().to_string(),
                attribute: part.to_string(),
            })
    }

    /// The composed value object, built from its columns on first access.
    pub fn aggregate<T: ValueObject>(&mut self, part: &str) -> Result<Arc<T>> {
        let composition = self.composition(part)?;
        composition.check_type::<T>()?;

        if let Some(cached) = self.aggregations.get(part) {
            if let Ok(value) = Arc::clone(cached).downcast::<T>() {
                return Ok(value);
            }
        }

        let values = composition
            .mapping
            .iter()
            .map(|(column, _)| self.get(column).clone())
            .collect();
        let value = Arc::new(T::compose(values));
        self.aggregations
            .insert(part.to_string(), Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        Ok(value)
    }

    /// Rebuild the value object from the current column values.
    pub fn reload_aggregate<T: ValueObject>(&mut self, part: &str) -> Result<Arc<T>> {
        self.aggregations.remove(part);
        self.aggregate(part)
    }

    /// Assign a value object: cache it and write each mapped attribute into
    /// its column, in mapping order.
    pub fn set_aggregate<T: ValueObject>(
        &mut self,
        part: &str,
        value: impl Into<Arc<T>>,
    ) -> Result<Arc<T>> {
        let composition = self.composition(part)?;
        composition.check_type::<T>()?;
        let value = value.into();

        for (column, attribute) in &composition.mapping {
            self.set(column, value.attribute(attribute))?;
        }
        self.aggregations
            .insert(part.to_string(), Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        Ok(value)
    }
}
