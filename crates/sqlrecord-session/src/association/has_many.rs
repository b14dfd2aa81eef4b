use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value};
use sqlrecord_query::{Condition, UpdateBuilder};

use super::{Association, AssociationKind, bind_all, check_type, refresh_counter, resolve};
use crate::class::ModelClass;
use crate::finders::{FindOptions, load_one};
use crate::record::{AssociationTarget, Record};
use crate::session::Session;

/// Load every target of a `has_many` association from the database.
pub(crate) fn load_targets(
    session: &Session,
    owner: &Record,
    association: &Association,
    target: &Arc<ModelClass>,
) -> Result<Vec<Record>> {
    if owner.is_new_record() {
        return Ok(Vec::new());
    }
    let id = owner.id();
    session.record_lazy_load(owner.class(), association.name());
    match association.finder_sql() {
        Some(sql) => session.find_by_sql(target, sql, &bind_all(sql, &id)),
        None => session.load(target, &association.scoped_select(session, target, &id)),
    }
}

/// COUNT statement for the targets of `owner_id`.
pub(crate) fn count_query(
    session: &Session,
    association: &Association,
    target: &ModelClass,
    owner_id: &Value,
) -> (String, Vec<Value>) {
    if let Some(sql) = association.counter_sql() {
        return (sql.to_string(), bind_all(sql, owner_id));
    }
    if let Some(sql) = association.finder_sql() {
        let sql = format!("SELECT COUNT(*) FROM ({sql}) AS counted");
        let params = bind_all(&sql, owner_id);
        return (sql, params);
    }
    association
        .scoped_select(session, target, owner_id)
        .build_count()
}

/// Recompute the owner's counter columns for this association: its own
/// `counter_cache`, and the column a `belongs_to` on the target class keeps
/// for it.
pub(crate) fn refresh_count(
    session: &Session,
    owner: &mut Record,
    association: &Association,
    target: &ModelClass,
) -> Result<()> {
    if owner.is_new_record() {
        return Ok(());
    }
    let id = owner.id();
    if let Some(column) = association.counter_cache_column() {
        let (sql, params) = count_query(session, association, target, &id);
        refresh_counter(session, owner, &column, &sql, params)?;
    }

    let owner_class = Arc::clone(owner.class());
    for back in target.associations() {
        if back.kind() != AssociationKind::BelongsTo
            || back.foreign_key() != association.foreign_key()
            || !owner_class.is_a(back.class_name())
        {
            continue;
        }
        let Some(column) = back.parent_counter_column(target) else {
            continue;
        };
        if owner_class.column(&column).is_none() || association.counter_cache_column() == Some(column.clone()) {
            continue;
        }
        let (sql, params) = session
            .select_for(target)
            .filter(Condition::eq(back.foreign_key(), id.clone()))
            .build_count();
        refresh_counter(session, owner, &column, &sql, params)?;
    }
    Ok(())
}

/// Access to a `has_many` collection of one record.
///
/// Targets load once into the owner's cache. Every mutation goes through
/// the database first and then updates the cache and the counter caches,
/// so a loaded collection, `len` and the owner's counter column agree.
pub struct HasMany<'a> {
    session: &'a Session,
    owner: &'a mut Record,
    association: Arc<Association>,
    target: Arc<ModelClass>,
}

impl Session {
    /// The `has_many` association `name` of `owner`.
    pub fn has_many<'a>(&'a self, owner: &'a mut Record, name: &str) -> Result<HasMany<'a>> {
        let (association, target) = resolve(self, owner, name, AssociationKind::HasMany)?;
        Ok(HasMany {
            session: self,
            owner,
            association,
            target,
        })
    }
}

impl<'a> HasMany<'a> {
    /// The association declaration.
    pub fn association(&self) -> &Association {
        &self.association
    }

    fn load_if_needed(&mut self, reload: bool) -> Result<()> {
        if reload || !self.owner.is_loaded(self.association.name()) {
            let targets = load_targets(self.session, self.owner, &self.association, &self.target)?;
            self.owner.associations.insert(
                self.association.name().to_string(),
                AssociationTarget::Many(targets),
            );
        }
        Ok(())
    }

    fn targets_mut(&mut self) -> &mut Vec<Record> {
        let entry = self
            .owner
            .associations
            .entry(self.association.name().to_string())
            .or_insert_with(|| AssociationTarget::Many(Vec::new()));
        if let AssociationTarget::One(_) = entry {
            *entry = AssociationTarget::Many(Vec::new());
        }
        match entry {
            AssociationTarget::Many(targets) => targets,
            AssociationTarget::One(_) => unreachable!(),
        }
    }

    /// The targets, loaded on first access.
    pub fn all(&mut self) -> Result<&mut [Record]> {
        self.load_if_needed(false)?;
        Ok(self.targets_mut().as_mut_slice())
    }

    /// Reload the targets from the database.
    pub fn reload(&mut self) -> Result<&mut [Record]> {
        self.load_if_needed(true)?;
        Ok(self.targets_mut().as_mut_slice())
    }

    /// Number of targets: the cached collection if loaded, else the counter
    /// cache column if declared, else a COUNT query.
    pub fn len(&mut self) -> Result<usize> {
        if let Some(AssociationTarget::Many(targets)) =
            self.owner.associations.get(self.association.name())
        {
            return Ok(targets.len());
        }
        if let Some(column) = self.association.counter_cache_column() {
            if let Some(n) = self.owner.get(&column).as_i64() {
                return Ok(n.max(0) as usize);
            }
        }
        Ok(self.count()?.max(0) as usize)
    }

    /// Whether the collection is empty.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// COUNT of the targets in the database.
    pub fn count(&self) -> Result<i64> {
        if self.owner.is_new_record() {
            return Ok(0);
        }
        let (sql, params) = count_query(self.session, &self.association, &self.target, &self.owner.id());
        Ok(self
            .session
            .select_value(&self.target, "Count", &sql, &params)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    /// One target by primary key.
    pub fn find(&self, id: impl Into<Value>) -> Result<Record> {
        let id = id.into();
        let not_found = || Error::not_found(self.target.name(), Some(id.to_string()));
        if self.owner.is_new_record() {
            return Err(not_found());
        }
        if self.association.finder_sql().is_some() {
            let targets = load_targets(self.session, self.owner, &self.association, &self.target)?;
            return targets
                .into_iter()
                .find(|t| t.id() == id)
                .ok_or_else(not_found);
        }
        let select = self
            .association
            .scoped_select(self.session, &self.target, &self.owner.id())
            .filter(Condition::eq(self.target.primary_key(), id.clone()));
        load_one(self.session, &self.target, select)?.ok_or_else(not_found)
    }

    /// Targets matching further options.
    pub fn find_all(&self, options: FindOptions) -> Result<Vec<Record>> {
        if self.owner.is_new_record() {
            return Ok(Vec::new());
        }
        if self.association.finder_sql().is_some() {
            return Err(Error::association(format!(
                "association {} uses finder_sql and cannot be scoped",
                self.association.name()
            )));
        }
        let select = options.apply(
            self.association
                .scoped_select(self.session, &self.target, &self.owner.id()),
            self.target.table_name(),
        );
        self.session.load(&self.target, &select)
    }

    /// Build an unsaved target pointing at the owner and add it to the
    /// collection; it is saved with the owner.
    pub fn build<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Result<&mut Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.session.new_record(&self.target, attributes)?;
        record.set(self.association.foreign_key(), self.owner.id())?;
        self.load_if_needed(false)?;
        let targets = self.targets_mut();
        let index = targets.len();
        targets.push(record);
        Ok(&mut targets[index])
    }

    /// Create a target pointing at the owner.
    pub fn create<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        if self.owner.is_new_record() {
            return Err(Error::association(format!(
                "cannot create {} for an unsaved {}",
                self.association.name(),
                self.owner.class().name()
            )));
        }
        let record = self.session.new_record(&self.target, attributes)?;
        let mut saved = self.attach(vec![record])?;
        saved
            .pop()
            .ok_or_else(|| Error::association("created record went missing"))
    }

    /// Point `records` at the owner and add them to the collection.
    ///
    /// When the owner is saved the records are saved at once, in one
    /// transaction; otherwise they are saved with the owner.
    pub fn add(&mut self, records: impl IntoIterator<Item = Record>) -> Result<()> {
        self.attach(records.into_iter().collect()).map(|_| ())
    }

    fn attach(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        for record in &records {
            check_type(&self.association, &self.target, record)?;
        }
        let owner_id = self.owner.id();
        let owner_saved = !self.owner.is_new_record();
        let fk = self.association.foreign_key().to_string();

        let saved = self.session.transaction(|s| {
            let mut saved = Vec::with_capacity(records.len());
            for mut record in records {
                record.set(&fk, owner_id.clone())?;
                if owner_saved {
                    s.save_strict(&mut record)?;
                }
                saved.push(record);
            }
            refresh_count(s, self.owner, &self.association, &self.target)?;
            Ok(saved)
        })?;

        if !owner_saved || self.owner.is_loaded(self.association.name()) {
            let targets = self.targets_mut();
            for record in &saved {
                targets.retain(|t| !t.same_record(record));
                targets.push(record.clone());
            }
        }
        Ok(saved)
    }

    /// Detach `records` from the owner: destroyed when the association is
    /// dependent, otherwise their foreign key is set to NULL.
    pub fn remove<'r>(&mut self, records: impl IntoIterator<Item = &'r Record>) -> Result<()> {
        let records: Vec<&Record> = records.into_iter().collect();
        for record in &records {
            check_type(&self.association, &self.target, record)?;
        }
        let owner_id = self.owner.id();
        let fk = self.association.foreign_key().to_string();

        self.session.transaction(|s| {
            for record in records.iter().filter(|r| r.is_persisted()) {
                if self.association.is_dependent() {
                    let mut doomed = (*record).clone();
                    s.destroy(&mut doomed)?;
                } else {
                    let update = UpdateBuilder::table(self.target.table_name())
                        .set(fk.as_str(), Value::Null)
                        .filter(Condition::eq(self.target.primary_key(), record.id()))
                        .filter(Condition::eq(&fk, owner_id.clone()));
                    s.execute_update(&self.target, "Update", &update)?;
                }
            }
            refresh_count(s, self.owner, &self.association, &self.target)
        })?;

        if let Some(AssociationTarget::Many(targets)) =
            self.owner.associations.get_mut(self.association.name())
        {
            targets.retain(|t| !records.iter().any(|r| t.same_record(r)));
        }
        Ok(())
    }

    /// Detach every target, honoring the dependent options.
    pub fn clear(&mut self) -> Result<()> {
        if self.owner.is_new_record() {
            self.targets_mut().clear();
            return Ok(());
        }
        let owner_id = self.owner.id();
        self.session.transaction(|s| {
            if self.association.is_dependent() {
                for mut record in load_targets(s, self.owner, &self.association, &self.target)? {
                    s.destroy(&mut record)?;
                }
            } else if self.association.is_exclusively_dependent() {
                let delete = s
                    .delete_scope(&self.target)
                    .filter(Condition::eq(self.association.foreign_key(), owner_id.clone()));
                s.execute_delete(&self.target, "Delete all", &delete)?;
            } else {
                let update = UpdateBuilder::table(self.target.table_name())
                    .set(self.association.foreign_key(), Value::Null)
                    .filter(Condition::eq(self.association.foreign_key(), owner_id.clone()));
                s.execute_update(&self.target, "Update all", &update)?;
            }
            refresh_count(s, self.owner, &self.association, &self.target)
        })?;
        self.targets_mut().clear();
        Ok(())
    }

    /// Destroy every target, running their callbacks.
    pub fn destroy_all(&mut self) -> Result<()> {
        if self.owner.is_new_record() {
            self.targets_mut().clear();
            return Ok(());
        }
        self.session.transaction(|s| {
            for mut record in load_targets(s, self.owner, &self.association, &self.target)? {
                s.destroy(&mut record)?;
            }
            refresh_count(s, self.owner, &self.association, &self.target)
        })?;
        self.targets_mut().clear();
        Ok(())
    }
}
