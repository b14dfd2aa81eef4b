//! Model classes and their declarations.
//!
//! A [`ModelClass`] is the runtime description of a table-backed class: its
//! columns, associations, compositions, callbacks, named methods and
//! validations. Classes are declared with a [`ModelBuilder`] and frozen by
//! [`ModelBuilder::build`], which reads the column list from the connection
//! and registers the class with the session.
//!
//! A class built with [`ModelBuilder::inherits`] shares its parent's table
//! (single-table inheritance). Everything inheritable is snapshotted at build
//! time: the subclass sees the parent's registrations first, then its own.
//!
//! ```ignore
//! let topic = ModelBuilder::new("Topic")
//!     .has_many("replies", json!({"dependent": true, "counter_cache": true}))?
//!     .before_save(Callback::method("touch"))
//!     .method("touch", |record, _session| record.set("written_on", Value::Null))
//!     .build(&session)?;
//!
//! let reply = ModelBuilder::new("Reply")
//!     .inherits(&topic)
//!     .belongs_to("topic", json!({"foreign_key": "parent_id", "counter_cache": true}))?
//!     .build(&session)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use sqlrecord_core::{Column, ConfigErrorKind, Error, Result, inflector};

use crate::aggregation::{Composition, CompositionOptions, ValueObject};
use crate::association::{
    Association, BelongsToOptions, HabtmOptions, HasManyOptions, HasOneOptions, parse_options,
};
use crate::callbacks::{Callback, CallbackChain, CallbackEvent, CallbackFn, LifecycleHooks};
use crate::config::PrimaryKeyPrefix;
use crate::record::Record;
use crate::session::Session;
use crate::validations::Validation;

/// Column holding the class name of each row under single-table inheritance.
pub const INHERITANCE_COLUMN: &str = "type";

/// A declared, immutable model class.
pub struct ModelClass {
    name: String,
    table_name: String,
    primary_key: String,
    columns: IndexMap<String, Column>,
    parent: Option<Arc<ModelClass>>,
    associations: IndexMap<String, Arc<Association>>,
    compositions: IndexMap<String, Composition>,
    callbacks: CallbackChain,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    methods: HashMap<String, CallbackFn>,
    validations: Vec<Validation>,
    virtual_attributes: Vec<String>,
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns.keys().collect::<Vec<_>>())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("associations", &self.associations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ModelClass {
    /// Class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table the class is stored in.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Columns in table order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Column names in table order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Whether `name` is a column or a declared virtual attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.columns.contains_key(name) || self.virtual_attributes.iter().any(|a| a == name)
    }

    /// Superclass, for single-table inheritance.
    pub fn parent(&self) -> Option<&Arc<ModelClass>> {
        self.parent.as_ref()
    }

    /// Root of the inheritance chain (the class itself when it has no parent).
    pub fn base_class(&self) -> &ModelClass {
        let mut class = self;
        while let Some(parent) = &class.parent {
            class = parent;
        }
        class
    }

    /// Whether this class is `name` or inherits from it.
    pub fn is_a(&self, name: &str) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if c.name == name {
                return true;
            }
            class = c.parent.as_deref();
        }
        false
    }

    /// Whether rows of this class carry their class name in the `type` column.
    pub fn uses_inheritance_column(&self) -> bool {
        self.parent.is_some() && self.columns.contains_key(INHERITANCE_COLUMN)
    }

    /// Snake-case plural of the class name, e.g. `replies` for `Reply`.
    pub fn collection_name(&self) -> String {
        inflector::tableize(&self.name)
    }

    /// Association by name.
    pub fn association(&self, name: &str) -> Option<Arc<Association>> {
        self.associations.get(name).cloned()
    }

    /// All associations, in declaration order (inherited first).
    pub fn associations(&self) -> impl Iterator<Item = &Arc<Association>> {
        self.associations.values()
    }

    /// Composition by part name.
    pub fn composition(&self, part: &str) -> Option<&Composition> {
        self.compositions.get(part)
    }

    /// Queued callbacks.
    pub fn callbacks(&self) -> &CallbackChain {
        &self.callbacks
    }

    /// Lifecycle hooks object.
    pub fn hooks(&self) -> Option<&Arc<dyn LifecycleHooks>> {
        self.hooks.as_ref()
    }

    /// Named method, for [`Callback::Method`].
    pub fn method(&self, name: &str) -> Option<&CallbackFn> {
        self.methods.get(name)
    }

    /// Declared validations.
    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }
}

/// Declares a [`ModelClass`].
///
/// Every declaration that takes options validates them immediately, so a
/// misspelled option fails at the declaration rather than at first use.
pub struct ModelBuilder {
    name: String,
    table_name: Option<String>,
    primary_key: Option<String>,
    parent: Option<Arc<ModelClass>>,
    associations: Vec<Association>,
    compositions: Vec<Composition>,
    callbacks: CallbackChain,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    methods: HashMap<String, CallbackFn>,
    validations: Vec<Validation>,
}

macro_rules! queue_methods {
    ($($method:ident => $event:ident),* $(,)?) => {
        $(
            #[doc = concat!("Queue a `", stringify!($method), "` callback.")]
            pub fn $method(mut self, callback: Callback) -> Self {
                self.callbacks.push(CallbackEvent::$event, callback);
                self
            }
        )*
    };
}

impl ModelBuilder {
    /// Start declaring a class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            primary_key: None,
            parent: None,
            associations: Vec::new(),
            compositions: Vec::new(),
            callbacks: CallbackChain::default(),
            hooks: None,
            methods: HashMap::new(),
            validations: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Override the primary key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Inherit from `parent`, sharing its table.
    pub fn inherits(mut self, parent: &Arc<ModelClass>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Declare a many-to-one association.
    pub fn belongs_to(self, name: &str, options: serde_json::Value) -> Result<Self> {
        let options = parse_options("belongs_to", name, options)?;
        Ok(self.belongs_to_with(name, options))
    }

    /// Declare a many-to-one association with typed options.
    pub fn belongs_to_with(mut self, name: &str, options: BelongsToOptions) -> Self {
        let association = Association::belongs_to(&self.name, name, options);
        self.associations.push(association);
        self
    }

    /// Declare a one-to-one association.
    pub fn has_one(self, name: &str, options: serde_json::Value) -> Result<Self> {
        let options = parse_options("has_one", name, options)?;
        Ok(self.has_one_with(name, options))
    }

    /// Declare a one-to-one association with typed options.
    pub fn has_one_with(mut self, name: &str, options: HasOneOptions) -> Self {
        let association = Association::has_one(&self.name, name, options);
        self.associations.push(association);
        self
    }

    /// Declare a one-to-many association.
    pub fn has_many(self, name: &str, options: serde_json::Value) -> Result<Self> {
        let options = parse_options("has_many", name, options)?;
        self.has_many_with(name, options)
    }

    /// Declare a one-to-many association with typed options.
    pub fn has_many_with(mut self, name: &str, options: HasManyOptions) -> Result<Self> {
        let association = Association::has_many(&self.name, name, options)?;
        self.associations.push(association);
        Ok(self)
    }

    /// Declare a many-to-many association through a join table.
    pub fn has_and_belongs_to_many(self, name: &str, options: serde_json::Value) -> Result<Self> {
        let options = parse_options("has_and_belongs_to_many", name, options)?;
        Ok(self.has_and_belongs_to_many_with(name, options))
    }

    /// Declare a many-to-many association with typed options.
    pub fn has_and_belongs_to_many_with(mut self, name: &str, options: HabtmOptions) -> Self {
        let association = Association::has_and_belongs_to_many(&self.name, name, options);
        self.associations.push(association);
        self
    }

    /// Compose columns into a value object of type `T`.
    pub fn composed_of<T: ValueObject>(mut self, part: &str, options: serde_json::Value) -> Result<Self> {
        self.compositions.push(Composition::from_json::<T>(part, options)?);
        Ok(self)
    }

    /// Compose columns into a value object with typed options.
    pub fn composed_of_with<T: ValueObject>(
        mut self,
        part: &str,
        options: CompositionOptions,
    ) -> Result<Self> {
        self.compositions.push(Composition::new::<T>(part, options)?);
        Ok(self)
    }

    /// Queue a callback for `event`.
    ///
    /// `after_find` and `after_initialize` cannot be queued; implement them
    /// on [`LifecycleHooks`] instead.
    pub fn callback(mut self, event: CallbackEvent, callback: Callback) -> Result<Self> {
        if !event.is_queueable() {
            return Err(Error::config(
                ConfigErrorKind::InvalidCallback,
                format!(
                    "{}: {event} callbacks can only be defined as LifecycleHooks methods",
                    self.name
                ),
            ));
        }
        self.callbacks.push(event, callback);
        Ok(self)
    }

    queue_methods! {
        before_validation => BeforeValidation,
        before_validation_on_create => BeforeValidationOnCreate,
        before_validation_on_update => BeforeValidationOnUpdate,
        after_validation => AfterValidation,
        after_validation_on_create => AfterValidationOnCreate,
        after_validation_on_update => AfterValidationOnUpdate,
        before_save => BeforeSave,
        before_create => BeforeCreate,
        before_update => BeforeUpdate,
        after_create => AfterCreate,
        after_update => AfterUpdate,
        after_save => AfterSave,
        before_destroy => BeforeDestroy,
        after_destroy => AfterDestroy,
    }

    /// Register a named method, callable through [`Callback::Method`].
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Record, &Session) -> Result<()> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    /// Attach the class's lifecycle hooks.
    pub fn hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Add a validation.
    pub fn validates(mut self, validation: Validation) -> Result<Self> {
        validation.check_declaration(&self.name)?;
        self.validations.push(validation);
        Ok(self)
    }

    /// Freeze the declaration, load the columns and register the class.
    #[tracing::instrument(level = "debug", skip(self, session), fields(class = %self.name))]
    pub fn build(self, session: &Session) -> Result<Arc<ModelClass>> {
        let (table_name, primary_key, columns) = match &self.parent {
            Some(parent) => (
                parent.table_name.clone(),
                parent.primary_key.clone(),
                parent.columns.clone(),
            ),
            None => {
                let table_name = self
                    .table_name
                    .clone()
                    .unwrap_or_else(|| default_table_name(session, &self.name));
                let primary_key = self
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| default_primary_key(session, &self.name));
                let columns = session.connection()?.columns(&table_name)?;
                if columns.is_empty() {
                    return Err(Error::config(
                        ConfigErrorKind::InvalidDeclaration,
                        format!("{}: table {table_name} has no columns", self.name),
                    ));
                }
                let columns: IndexMap<String, Column> =
                    columns.into_iter().map(|c| (c.name.clone(), c)).collect();
                (table_name, primary_key, columns)
            }
        };

        let mut associations: IndexMap<String, Arc<Association>> = IndexMap::new();
        let mut compositions: IndexMap<String, Composition> = IndexMap::new();
        let mut callbacks = CallbackChain::default();
        let mut methods: HashMap<String, CallbackFn> = HashMap::new();
        let mut validations: Vec<Validation> = Vec::new();
        let mut hooks: Option<Arc<dyn LifecycleHooks>> = None;
        if let Some(parent) = &self.parent {
            associations.extend(parent.associations.clone());
            compositions.extend(parent.compositions.clone());
            callbacks.extend(&parent.callbacks);
            methods.extend(parent.methods.clone());
            validations.extend(parent.validations.iter().cloned());
            hooks.clone_from(&parent.hooks);
        }

        for association in self.associations {
            associations.insert(association.name().to_string(), Arc::new(association));
        }
        for composition in self.compositions {
            if let Some((column, _)) = composition
                .mapping()
                .iter()
                .find(|(column, _)| !columns.contains_key(column))
            {
                return Err(Error::config(
                    ConfigErrorKind::InvalidDeclaration,
                    format!(
                        "{}: composed_of :{} maps unknown column {column}",
                        self.name,
                        composition.part()
                    ),
                ));
            }
            compositions.insert(composition.part().to_string(), composition);
        }
        callbacks.extend(&self.callbacks);
        methods.extend(self.methods);
        validations.extend(self.validations);
        if self.hooks.is_some() {
            hooks = self.hooks;
        }

        let mut virtual_attributes: Vec<String> = Vec::new();
        for name in validations.iter().flat_map(Validation::virtual_attributes) {
            if !columns.contains_key(&name) && !virtual_attributes.contains(&name) {
                virtual_attributes.push(name);
            }
        }

        let class = Arc::new(ModelClass {
            name: self.name,
            table_name,
            primary_key,
            columns,
            parent: self.parent,
            associations,
            compositions,
            callbacks,
            hooks,
            methods,
            validations,
            virtual_attributes,
        });
        tracing::debug!(
            class = %class.name,
            table = %class.table_name,
            columns = class.columns.len(),
            associations = class.associations.len(),
            "Model class built"
        );
        session.register(Arc::clone(&class));
        Ok(class)
    }
}

fn default_table_name(session: &Session, class_name: &str) -> String {
    let config = session.config();
    let base = if config.pluralize_table_names {
        inflector::tableize(class_name)
    } else {
        inflector::underscore(class_name)
    };
    format!(
        "{}{base}{}",
        config.table_name_prefix, config.table_name_suffix
    )
}

fn default_primary_key(session: &Session, class_name: &str) -> String {
    let base = inflector::underscore(class_name);
    match session.config().primary_key_prefix {
        PrimaryKeyPrefix::None => "id".to_string(),
        PrimaryKeyPrefix::TableName => format!("{base}id"),
        PrimaryKeyPrefix::TableNameWithUnderscore => format!("{base}_id"),
    }
}
