//! Saving and destroying records.
//!
//! `save` runs the whole callback chain inside one transaction:
//!
//! ```text
//! before_validation, before_validation_on_create|update
//! declared validations, validate, validate_on_create|update hooks
//! after_validation, after_validation_on_create|update
//! before_save, before_create|update
//! INSERT or UPDATE, counter caches, autosaved associations
//! after_create|update, after_save
//! ```
//!
//! `destroy` runs `before_destroy`, the dependent cascades, the DELETE and
//! `after_destroy` in one transaction; the record is frozen only once that
//! transaction committed.

use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value, ValidationFailed};
use sqlrecord_query::{Condition, DeleteBuilder, InsertBuilder, UpdateBuilder};

use crate::association::{self, AssociationKind};
use crate::callbacks::CallbackEvent;
use crate::class::ModelClass;
use crate::record::{AssociationTarget, Record};
use crate::session::{ClassRef, Session};

impl Session {
    /// Validate and save a record.
    ///
    /// Returns `Ok(false)` when validation fails; the messages are left in
    /// [`Record::errors`]. Any other failure, including a callback veto,
    /// rolls back the transaction, restores the record to its state before
    /// the call and is returned as an error.
    #[tracing::instrument(level = "debug", skip(self, record), fields(class = %record.class().name()))]
    pub fn save(&self, record: &mut Record) -> Result<bool> {
        self.save_with(record, true)
    }

    /// Like [`save`](Self::save), but a validation failure is an
    /// [`Error::Validation`].
    pub fn save_strict(&self, record: &mut Record) -> Result<()> {
        if self.save(record)? {
            Ok(())
        } else {
            Err(validation_error(record))
        }
    }

    /// Build and save a record. The record is returned even when it failed
    /// validation; check [`Record::is_new_record`] or its errors.
    pub fn create<K, V>(
        &self,
        class: impl ClassRef,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.new_record(class, attributes)?;
        self.save(&mut record)?;
        Ok(record)
    }

    /// Build and save a record; a validation failure is an error.
    pub fn create_strict<K, V>(
        &self,
        class: impl ClassRef,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.new_record(class, attributes)?;
        self.save_strict(&mut record)?;
        Ok(record)
    }

    /// Set one attribute and save without validation.
    pub fn update_attribute(
        &self,
        record: &mut Record,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        record.set(name, value)?;
        self.save_with(record, false).map(|_| ())
    }

    /// Set several attributes and save.
    pub fn update_attributes<K, V>(
        &self,
        record: &mut Record,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<bool>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        record.set_attributes(attributes)?;
        self.save(record)
    }

    /// Run the validation half of the save chain without saving.
    pub fn is_valid(&self, record: &mut Record) -> Result<bool> {
        let creating = record.is_new_record();
        self.run_validations(record, creating)
    }

    /// Re-read the record's row, dropping every cached association and
    /// value object.
    pub fn reload(&self, record: &mut Record) -> Result<()> {
        let class = Arc::clone(record.class());
        let id = record.id();
        let (sql, params) = self
            .select_for(&class)
            .filter(Condition::eq(class.primary_key(), id.clone()))
            .limit(1)
            .build();
        let row = self
            .select_rows(&class, "Load", &sql, &params)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(class.name(), Some(id.to_string())))?;
        record.replace_attributes(Record::from_row(class, row));
        Ok(())
    }

    /// Destroy a record and its dependents, then freeze it.
    #[tracing::instrument(level = "debug", skip(self, record), fields(class = %record.class().name(), id = %record.id()))]
    pub fn destroy(&self, record: &mut Record) -> Result<()> {
        if record.is_destroyed() {
            return Err(Error::Frozen {
                model: record.class().name().to_string(),
            });
        }
        let snapshot = record.clone();
        match self.transaction(|s| s.destroy_in_transaction(record)) {
            Ok(()) => {
                record.mark_destroyed();
                tracing::debug!("Record destroyed");
                Ok(())
            }
            Err(e) => {
                *record = snapshot;
                Err(e)
            }
        }
    }

    pub(crate) fn save_with(&self, record: &mut Record, validate: bool) -> Result<bool> {
        if record.is_destroyed() {
            return Err(Error::Frozen {
                model: record.class().name().to_string(),
            });
        }
        let snapshot = record.clone();
        match self.transaction(|s| s.save_in_transaction(record, validate)) {
            Ok(saved) => Ok(saved),
            Err(e) => {
                let errors = record.errors().clone();
                *record = snapshot;
                *record.errors_mut() = errors;
                Err(e)
            }
        }
    }

    fn save_in_transaction(&self, record: &mut Record, validate: bool) -> Result<bool> {
        let creating = record.is_new_record();
        if validate && !self.run_validations(record, creating)? {
            tracing::debug!(errors = record.errors().len(), "Validation failed");
            return Ok(false);
        }

        self.fire(CallbackEvent::BeforeSave, record)?;
        self.fire(
            if creating {
                CallbackEvent::BeforeCreate
            } else {
                CallbackEvent::BeforeUpdate
            },
            record,
        )?;

        self.save_belongs_to_targets(record)?;
        if creating {
            self.insert_record(record)?;
        } else {
            self.update_record(record)?;
        }
        self.autosave_associations(record, creating)?;

        self.fire(
            if creating {
                CallbackEvent::AfterCreate
            } else {
                CallbackEvent::AfterUpdate
            },
            record,
        )?;
        self.fire(CallbackEvent::AfterSave, record)?;
        Ok(true)
    }

    fn run_validations(&self, record: &mut Record, creating: bool) -> Result<bool> {
        record.errors_mut().clear();
        self.fire(CallbackEvent::BeforeValidation, record)?;
        self.fire(
            if creating {
                CallbackEvent::BeforeValidationOnCreate
            } else {
                CallbackEvent::BeforeValidationOnUpdate
            },
            record,
        )?;

        let class = Arc::clone(record.class());
        let mut errors = std::mem::take(record.errors_mut());
        for validation in class.validations() {
            validation.run(self, record, creating, &mut errors)?;
        }
        *record.errors_mut() = errors;

        if let Some(hooks) = class.hooks() {
            hooks.validate(record, self)?;
            if creating {
                hooks.validate_on_create(record, self)?;
            } else {
                hooks.validate_on_update(record, self)?;
            }
        }

        self.fire(CallbackEvent::AfterValidation, record)?;
        self.fire(
            if creating {
                CallbackEvent::AfterValidationOnCreate
            } else {
                CallbackEvent::AfterValidationOnUpdate
            },
            record,
        )?;
        Ok(record.errors().is_empty())
    }

    fn insert_record(&self, record: &mut Record) -> Result<()> {
        let class = Arc::clone(record.class());
        let pk = class.primary_key();
        let values = record
            .storage_values()
            .into_iter()
            .filter(|(name, value)| !(name == pk && value.is_null()));
        let insert = InsertBuilder::into(class.table_name()).values(values);
        let generated = self.execute_insert(&class, &insert)?;
        if let (true, Some(id)) = (record.id().is_null(), generated) {
            record.set_id(id);
        }
        record.mark_persisted();
        tracing::debug!(class = %class.name(), id = %record.id(), "Record created");
        self.refresh_collection_counters(record, RowChange::Created)?;

        for association in class.associations() {
            if association.kind() != AssociationKind::BelongsTo {
                continue;
            }
            let parent_id = record.get(association.foreign_key()).clone();
            self.adjust_parent_counter(record, association, &parent_id, 1)?;
        }
        Ok(())
    }

    fn update_record(&self, record: &mut Record) -> Result<()> {
        let class = Arc::clone(record.class());

        for association in class.associations() {
            if association.kind() != AssociationKind::BelongsTo {
                continue;
            }
            let before = record.original(association.foreign_key()).clone();
            let after = record.get(association.foreign_key()).clone();
            if before != after {
                self.adjust_parent_counter(record, association, &before, -1)?;
                self.adjust_parent_counter(record, association, &after, 1)?;
            }
        }

        let counters = self.counter_columns(&class);
        let mut update = UpdateBuilder::table(class.table_name());
        for (name, value) in record.storage_values() {
            if name != class.primary_key() && !counters.contains(&name) {
                update = update.set(name, value);
            }
        }
        let update = update.filter(Condition::eq(class.primary_key(), record.id()));
        self.execute_update(&class, "Update", &update)?;
        self.refresh_collection_counters(record, RowChange::Updated)?;
        record.mark_persisted();
        Ok(())
    }

    /// Counter-cache columns of `class`; saves never overwrite them.
    fn counter_columns(&self, class: &ModelClass) -> Vec<String> {
        let mut columns: Vec<String> = class
            .associations()
            .filter(|a| a.kind().is_collection())
            .filter_map(|a| a.counter_cache_column())
            .collect();

        for other in self.classes() {
            for a in other.associations() {
                if !class.is_a(a.class_name()) {
                    continue;
                }
                let column = match a.kind() {
                    AssociationKind::BelongsTo => a.parent_counter_column(&other),
                    AssociationKind::HasAndBelongsToMany => {
                        a.association_counter_cache_column(&other)
                    }
                    _ => None,
                };
                columns.extend(column);
            }
        }
        columns
    }

    /// Move a `belongs_to` counter on the parent row and on the cached
    /// parent, if any.
    fn adjust_parent_counter(
        &self,
        record: &mut Record,
        association: &association::Association,
        parent_id: &Value,
        delta: i64,
    ) -> Result<()> {
        let Some(column) = association.parent_counter_column(record.class()) else {
            return Ok(());
        };
        if parent_id.is_null() {
            return Ok(());
        }
        let parent = self.class(association.class_name())?;
        self.update_counter(&parent, &column, parent_id.clone(), delta)?;

        if let Some(AssociationTarget::One(Some(cached))) =
            record.associations.get_mut(association.name())
        {
            if cached.id() == *parent_id {
                let count = cached.get(&column).as_i64().unwrap_or(0) + delta;
                cached.write_clean(&column, Value::Int(count));
            }
        }
        Ok(())
    }

    /// Recompute the `has_many` counter caches of every parent row the
    /// written child points at, or pointed at before the write.
    fn refresh_collection_counters(&self, record: &mut Record, change: RowChange) -> Result<()> {
        let child = Arc::clone(record.class());
        for owner in self.classes() {
            for association in owner.associations() {
                if association.kind() != AssociationKind::HasMany
                    || !child.is_a(association.class_name())
                {
                    continue;
                }
                let Some(column) = association.counter_cache_column() else {
                    continue;
                };
                if owner.column(&column).is_none() {
                    continue;
                }

                let fk = association.foreign_key();
                let current = record.get(fk).clone();
                let previous = record.original(fk).clone();
                let mut parent_ids = Vec::with_capacity(2);
                match change {
                    RowChange::Created => parent_ids.push(current),
                    RowChange::Updated if previous == current => {}
                    RowChange::Updated | RowChange::Destroyed => {
                        parent_ids.push(current);
                        if !parent_ids.contains(&previous) {
                            parent_ids.push(previous);
                        }
                    }
                }
                parent_ids.retain(|id| !id.is_null());
                if parent_ids.is_empty() {
                    continue;
                }

                let target = self.class(association.class_name())?;
                for parent_id in parent_ids {
                    let (sql, params) =
                        association::has_many::count_query(self, association, &target, &parent_id);
                    let count =
                        association::recount(self, &owner, &parent_id, &column, &sql, params)?;
                    for cached in record.associations.values_mut() {
                        if let AssociationTarget::One(Some(parent)) = cached {
                            if parent.class().is_a(owner.name()) && parent.id() == parent_id {
                                parent.write_clean(&column, count.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Save new `belongs_to` targets first so the foreign key can be set.
    fn save_belongs_to_targets(&self, record: &mut Record) -> Result<()> {
        let class = Arc::clone(record.class());
        for association in class.associations() {
            if association.kind() != AssociationKind::BelongsTo {
                continue;
            }
            let Some(AssociationTarget::One(Some(target))) =
                record.associations.get_mut(association.name())
            else {
                continue;
            };
            if !target.is_new_record() {
                continue;
            }
            self.save_strict(target)?;
            let id = target.id();
            record.set(association.foreign_key(), id)?;
        }
        Ok(())
    }

    /// Save cached `has_many`/`has_one` targets that are new (or all of them
    /// when the owner was just created), pointing them at the owner.
    fn autosave_associations(&self, record: &mut Record, created: bool) -> Result<()> {
        let class = Arc::clone(record.class());
        let owner_id = record.id();

        for association in class.associations() {
            let saved = match record.associations.get_mut(association.name()) {
                Some(AssociationTarget::Many(targets))
                    if association.kind() == AssociationKind::HasMany =>
                {
                    let mut saved = false;
                    for target in targets.iter_mut().filter(|t| created || t.is_new_record()) {
                        target.set(association.foreign_key(), owner_id.clone())?;
                        self.save_strict(target)?;
                        saved = true;
                    }
                    saved
                }
                Some(AssociationTarget::One(Some(target)))
                    if association.kind() == AssociationKind::HasOne
                        && (created || target.is_new_record()) =>
                {
                    target.set(association.foreign_key(), owner_id.clone())?;
                    self.save_strict(target)?;
                    false
                }
                _ => false,
            };

            if saved {
                let target = self.class(association.class_name())?;
                association::has_many::refresh_count(self, record, association, &target)?;
            }
        }
        Ok(())
    }

    fn destroy_in_transaction(&self, record: &mut Record) -> Result<()> {
        self.fire(CallbackEvent::BeforeDestroy, record)?;

        let class = Arc::clone(record.class());
        for association in class.associations() {
            let target_class = || self.class(association.class_name());
            match association.kind() {
                AssociationKind::HasMany if association.is_dependent() => {
                    let target = target_class()?;
                    let children =
                        association::has_many::load_targets(self, record, association, &target)?;
                    for mut child in children {
                        self.destroy(&mut child)?;
                    }
                    record
                        .associations
                        .insert(association.name().to_string(), AssociationTarget::Many(Vec::new()));
                }
                AssociationKind::HasMany if association.is_exclusively_dependent() => {
                    let target = target_class()?;
                    let delete = self
                        .delete_scope(&target)
                        .filter(Condition::eq(association.foreign_key(), record.id()));
                    self.execute_delete(&target, "Delete all", &delete)?;
                    record
                        .associations
                        .insert(association.name().to_string(), AssociationTarget::Many(Vec::new()));
                }
                AssociationKind::HasOne if association.is_dependent() => {
                    let target = target_class()?;
                    if let Some(mut child) =
                        association::has_one::load_target(self, record, association, &target)?
                    {
                        self.destroy(&mut child)?;
                    }
                    record
                        .associations
                        .insert(association.name().to_string(), AssociationTarget::One(None));
                }
                AssociationKind::HasAndBelongsToMany => {
                    let target = target_class()?;
                    association::habtm::purge_owner(self, record, association, &target)?;
                }
                _ => {}
            }
        }

        if record.is_persisted() {
            let delete = DeleteBuilder::from(class.table_name())
                .filter(Condition::eq(class.primary_key(), record.id()));
            self.execute_delete(&class, "Destroy", &delete)?;

            for association in class.associations() {
                if association.kind() == AssociationKind::BelongsTo {
                    let parent_id = record.get(association.foreign_key()).clone();
                    self.adjust_parent_counter(record, association, &parent_id, -1)?;
                }
            }
            self.refresh_collection_counters(record, RowChange::Destroyed)?;
        }

        self.fire(CallbackEvent::AfterDestroy, record)
    }

    /// DELETE over the class's table, scoped like [`Session::select_for`].
    pub(crate) fn delete_scope(&self, class: &ModelClass) -> DeleteBuilder {
        let delete = DeleteBuilder::from(class.table_name());
        match self.inheritance_scope(class) {
            Some(scope) => delete.filter(scope),
            None => delete,
        }
    }
}

/// Kind of write made to a child row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowChange {
    Created,
    Updated,
    Destroyed,
}

fn validation_error(record: &Record) -> Error {
    Error::Validation(ValidationFailed {
        model: record.class().name().to_string(),
        errors: record.errors().clone(),
    })
}
