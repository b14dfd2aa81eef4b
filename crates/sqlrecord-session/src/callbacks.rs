//! Lifecycle callbacks.
//!
//! Callbacks are hooks into the life cycle of a record: they fire around
//! validation, creation, update and destruction. For every event the session
//! runs, in order:
//!
//! 1. the queued [`Callback`]s of the class, ancestors' registrations first,
//! 2. the matching [`LifecycleHooks`] method of the class,
//! 3. every [`Observer`] registered for the class or one of its ancestors.
//!
//! A callback returning `Err` aborts the operation in progress; the
//! enclosing transaction is rolled back and the error is returned to the
//! caller. Use [`Error::aborted`](sqlrecord_core::Error::aborted) to veto
//! without a more specific error.
//!
//! `after_find` and `after_initialize` run for every row a query
//! materializes, so they can only be implemented as [`LifecycleHooks`]
//! methods, never queued.

use std::fmt;
use std::sync::Arc;

use sqlrecord_core::{ConfigErrorKind, Error, Result};

use crate::class::ModelClass;
use crate::record::Record;
use crate::session::Session;

/// Points in a record's life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    AfterFind,
    AfterInitialize,
    BeforeValidation,
    BeforeValidationOnCreate,
    BeforeValidationOnUpdate,
    AfterValidation,
    AfterValidationOnCreate,
    AfterValidationOnUpdate,
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    AfterCreate,
    AfterUpdate,
    AfterSave,
    BeforeDestroy,
    AfterDestroy,
}

impl CallbackEvent {
    /// Snake-case name of the event, as used for method lookups.
    pub const fn as_str(self) -> &'static str {
        match self {
            CallbackEvent::AfterFind => "after_find",
            CallbackEvent::AfterInitialize => "after_initialize",
            CallbackEvent::BeforeValidation => "before_validation",
            CallbackEvent::BeforeValidationOnCreate => "before_validation_on_create",
            CallbackEvent::BeforeValidationOnUpdate => "before_validation_on_update",
            CallbackEvent::AfterValidation => "after_validation",
            CallbackEvent::AfterValidationOnCreate => "after_validation_on_create",
            CallbackEvent::AfterValidationOnUpdate => "after_validation_on_update",
            CallbackEvent::BeforeSave => "before_save",
            CallbackEvent::BeforeCreate => "before_create",
            CallbackEvent::BeforeUpdate => "before_update",
            CallbackEvent::AfterCreate => "after_create",
            CallbackEvent::AfterUpdate => "after_update",
            CallbackEvent::AfterSave => "after_save",
            CallbackEvent::BeforeDestroy => "before_destroy",
            CallbackEvent::AfterDestroy => "after_destroy",
        }
    }

    /// Whether registrations for this event may be queued.
    pub const fn is_queueable(self) -> bool {
        !matches!(
            self,
            CallbackEvent::AfterFind | CallbackEvent::AfterInitialize
        )
    }
}

impl fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callable registered on a class.
pub type CallbackFn = Arc<dyn Fn(&mut Record, &Session) -> Result<()> + Send + Sync>;

/// A queued callback registration.
#[derive(Clone)]
pub enum Callback {
    /// A named method of the class, resolved when the callback fires.
    Method(String),
    /// An inline closure.
    Closure(CallbackFn),
    /// An object whose same-named [`LifecycleHooks`] method is invoked.
    Delegate(Arc<dyn LifecycleHooks>),
}

impl Callback {
    /// Refer to a method registered with `ModelBuilder::method`.
    pub fn method(name: impl Into<String>) -> Self {
        Callback::Method(name.into())
    }

    /// Wrap a closure.
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&mut Record, &Session) -> Result<()> + Send + Sync + 'static,
    {
        Callback::Closure(Arc::new(f))
    }

    /// Delegate to an object implementing [`LifecycleHooks`].
    pub fn delegate(hooks: impl LifecycleHooks + 'static) -> Self {
        Callback::Delegate(Arc::new(hooks))
    }

    fn invoke(
        &self,
        event: CallbackEvent,
        class: &ModelClass,
        record: &mut Record,
        session: &Session,
    ) -> Result<()> {
        match self {
            Callback::Method(name) => {
                let Some(method) = class.method(name) else {
                    return Err(Error::config(
                        ConfigErrorKind::InvalidCallback,
                        format!(
                            "{} callback `{name}` is not a method of {}",
                            event,
                            class.name()
                        ),
                    ));
                };
                method(record, session)
            }
            Callback::Closure(f) => f(record, session),
            Callback::Delegate(hooks) => dispatch(hooks.as_ref(), event, record, session),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Callback::Closure(_) => f.write_str("Closure(..)"),
            Callback::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

/// Ordered callback registrations per event.
///
/// A chain is immutable once its class is built; a subclass chain starts as a
/// copy of its parent's.
#[derive(Debug, Clone, Default)]
pub struct CallbackChain {
    entries: Vec<(CallbackEvent, Callback)>,
}

impl CallbackChain {
    /// Append a registration.
    pub(crate) fn push(&mut self, event: CallbackEvent, callback: Callback) {
        self.entries.push((event, callback));
    }

    /// Append every registration of another chain.
    pub(crate) fn extend(&mut self, other: &CallbackChain) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Registrations for one event, in firing order.
    pub fn for_event(&self, event: CallbackEvent) -> impl Iterator<Item = &Callback> {
        self.entries
            .iter()
            .filter(move |(e, _)| *e == event)
            .map(|(_, cb)| cb)
    }

    /// Number of registrations for one event.
    pub fn len_for(&self, event: CallbackEvent) -> usize {
        self.for_event(event).count()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle methods of a class. Every method defaults to doing nothing.
///
/// The `validate*` methods add messages to [`Record::errors_mut`] to reject
/// a record; they run after the declared validations.
#[allow(unused_variables)]
pub trait LifecycleHooks: Send + Sync {
    fn after_find(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_initialize(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_validation(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_validation_on_create(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_validation_on_update(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn validate(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn validate_on_create(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn validate_on_update(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_validation(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_validation_on_create(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_validation_on_update(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_save(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_create(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_update(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_create(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_update(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_save(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn before_destroy(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
    fn after_destroy(&self, record: &mut Record, session: &Session) -> Result<()> {
        Ok(())
    }
}

/// Invoke the hooks method matching `event`.
pub fn dispatch(
    hooks: &dyn LifecycleHooks,
    event: CallbackEvent,
    record: &mut Record,
    session: &Session,
) -> Result<()> {
    match event {
        CallbackEvent::AfterFind => hooks.after_find(record, session),
        CallbackEvent::AfterInitialize => hooks.after_initialize(record, session),
        CallbackEvent::BeforeValidation => hooks.before_validation(record, session),
        CallbackEvent::BeforeValidationOnCreate => {
            hooks.before_validation_on_create(record, session)
        }
        CallbackEvent::BeforeValidationOnUpdate => {
            hooks.before_validation_on_update(record, session)
        }
        CallbackEvent::AfterValidation => hooks.after_validation(record, session),
        CallbackEvent::AfterValidationOnCreate => hooks.after_validation_on_create(record, session),
        CallbackEvent::AfterValidationOnUpdate => hooks.after_validation_on_update(record, session),
        CallbackEvent::BeforeSave => hooks.before_save(record, session),
        CallbackEvent::BeforeCreate => hooks.before_create(record, session),
        CallbackEvent::BeforeUpdate => hooks.before_update(record, session),
        CallbackEvent::AfterCreate => hooks.after_create(record, session),
        CallbackEvent::AfterUpdate => hooks.after_update(record, session),
        CallbackEvent::AfterSave => hooks.after_save(record, session),
        CallbackEvent::BeforeDestroy => hooks.before_destroy(record, session),
        CallbackEvent::AfterDestroy => hooks.after_destroy(record, session),
    }
}

/// Receives lifecycle notifications for the classes it is registered on,
/// after the class's own callbacks ran.
pub trait Observer {
    fn notify(&self, event: CallbackEvent, record: &mut Record) -> Result<()>;
}

impl Session {
    /// Fire one lifecycle event for a record.
    pub(crate) fn fire(&self, event: CallbackEvent, record: &mut Record) -> Result<()> {
        let class = Arc::clone(record.class());

        if event.is_queueable() {
            for callback in class.callbacks().for_event(event) {
                callback.invoke(event, &class, record, self)?;
            }
        }
        if let Some(hooks) = class.hooks() {
            dispatch(hooks.as_ref(), event, record, self)?;
        }
        for observer in self.observers_for(&class) {
            observer.notify(event, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(CallbackEvent::BeforeSave.to_string(), "before_save");
        assert_eq!(
            CallbackEvent::AfterValidationOnUpdate.as_str(),
            "after_validation_on_update"
        );
    }

    #[test]
    fn test_find_and_initialize_are_not_queueable() {
        assert!(!CallbackEvent::AfterFind.is_queueable());
        assert!(!CallbackEvent::AfterInitialize.is_queueable());
        assert!(CallbackEvent::BeforeDestroy.is_queueable());
    }

    #[test]
    fn test_chain_preserves_order_per_event() {
        let mut parent = CallbackChain::default();
        parent.push(CallbackEvent::BeforeSave, Callback::method("parent_first"));
        parent.push(CallbackEvent::AfterSave, Callback::method("other_event"));

        let mut child = CallbackChain::default();
        child.extend(&parent);
        child.push(CallbackEvent::BeforeSave, Callback::method("child_second"));

        let names: Vec<String> = child
            .for_event(CallbackEvent::BeforeSave)
            .map(|cb| format!("{cb:?}"))
            .collect();
        assert_eq!(
            names,
            [r#"Method("parent_first")"#, r#"Method("child_second")"#]
        );
        assert_eq!(parent.len_for(CallbackEvent::BeforeSave), 1);
    }
}
