//! Object-relational mapping engine for SQLRecord.
//!
//! A [`Session`] owns the database connection and the registry of model
//! classes. Classes are declared at runtime with a [`ModelBuilder`]: the
//! table's columns are read from the connection, and the builder adds
//! associations, value-object compositions, validations and lifecycle
//! callbacks. Instances are dynamic [`Record`]s whose attributes are coerced
//! through their column types.
//!
//! # Example
//!
//! ```ignore
//! let firm = ModelBuilder::new("Firm")
//!     .has_many("clients", json!({"dependent": true, "counter_cache": true}))?
//!     .build(&session)?;
//! let client = ModelBuilder::new("Client")
//!     .belongs_to("firm", json!({}))?
//!     .build(&session)?;
//!
//! let mut signals = session.create_strict(&firm, attributes! { "name" => "37signals" })?;
//! session.has_many(&mut signals, "clients")?
//!     .create(attributes! { "name" => "Summit" })?;
//! assert_eq!(signals.get("clients_count"), &Value::Int(1));
//!
//! // Destroys the clients too, all in one transaction.
//! session.destroy(&mut signals)?;
//! ```
//!
//! # Consistency
//!
//! Every write runs in a transaction. Transactions nest: only the outermost
//! scope commits, so a failure anywhere in a cascade rolls back the whole
//! operation. Association handles update the owner's cached targets and
//! counter caches together with the rows, so in-memory state and the
//! database agree after every successful call.

pub mod aggregation;
pub mod association;
pub mod callbacks;
pub mod class;
pub mod config;
pub mod finders;
pub mod lazy_load;
mod persistence;
pub mod provider;
pub mod record;
pub mod session;
pub mod validations;

pub use aggregation::{Composition, CompositionOptions, ValueObject};
pub use association::{
    Association, AssociationKind, BelongsTo, BelongsToOptions, CounterCache, HabtmOptions,
    HasAndBelongsToMany, HasMany, HasManyOptions, HasOne, HasOneOptions,
};
pub use callbacks::{Callback, CallbackChain, CallbackEvent, CallbackFn, LifecycleHooks, Observer};
pub use class::{INHERITANCE_COLUMN, ModelBuilder, ModelClass};
pub use config::{PrimaryKeyPrefix, SessionConfig};
pub use finders::FindOptions;
pub use lazy_load::{CallSite, LAZY_LOAD_TARGET, LazyLoadStats, LazyLoadTracker};
pub use provider::{AdapterFactory, ConnectionProvider};
pub use record::{Attributes, Record, RecordState};
pub use session::{ClassRef, Session};
pub use validations::{Validation, ValidationContext};

pub use sqlrecord_core::Value;
pub use sqlrecord_query::Condition;

/// Build an attribute list for `new_record`, `create` and friends.
///
/// ```
/// use sqlrecord_session::{Value, attributes};
///
/// let attrs = attributes! { "title" => "The First Topic", "replies_count" => 0 };
/// assert_eq!(attrs[0], ("title".to_string(), Value::from("The First Topic")));
/// ```
#[macro_export]
macro_rules! attributes {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::Value)>::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((::std::string::String::from($name), $crate::Value::from($value))),+]
    };
}
