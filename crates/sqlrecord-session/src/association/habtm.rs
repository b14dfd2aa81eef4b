use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value};
use sqlrecord_query::{Condition, DeleteBuilder, InsertBuilder, SelectBuilder};

use super::{Association, AssociationKind, bind_all, check_type, recount, refresh_counter, resolve};
use crate::class::ModelClass;
use crate::finders::load_one;
use crate::record::{AssociationTarget, Record};
use crate::session::Session;

fn association_foreign_key(association: &Association) -> Result<&str> {
    association.association_foreign_key().ok_or_else(|| {
        Error::association(format!(
            "association {} has no association_foreign_key",
            association.name()
        ))
    })
}

/// SELECT of the targets joined to `owner_id` through the join table.
///
/// Join table columns come first, so extra join attributes show up on the
/// loaded records while the target's own columns win on a name clash.
fn joined_select(
    session: &Session,
    owner: &ModelClass,
    association: &Association,
    target: &ModelClass,
    owner_id: &Value,
) -> Result<SelectBuilder> {
    let join = association.join_table(owner, target);
    let afk = association_foreign_key(association)?;
    let table = target.table_name();
    let columns = [format!("{join}.*"), format!("{table}.*")];
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    Ok(session
        .select_for(target)
        .columns(&columns)
        .join(format!(
            "INNER JOIN {join} ON {table}.{pk} = {join}.{afk}",
            pk = target.primary_key()
        ))
        .filter(Condition::eq(
            &format!("{join}.{}", association.foreign_key()),
            owner_id.clone(),
        ))
        .filter_opt(association.conditions_clause())
        .order_by(association.order().unwrap_or_default()))
}

/// Parameters for custom join SQL: the owner id for the first `?`, the
/// target id for every other one.
fn join_params(sql: &str, owner_id: &Value, target_id: &Value) -> Vec<Value> {
    let mut params = bind_all(sql, target_id);
    if let Some(first) = params.first_mut() {
        *first = owner_id.clone();
    }
    params
}

fn load_all(
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
        None => {
            let select = joined_select(session, owner.class(), association, target, &id)?;
            session.load(target, &select)
        }
    }
}

/// Recompute `association_counter_cache` on each target row and return the
/// new values.
fn refresh_target_counters(
    session: &Session,
    owner: &ModelClass,
    association: &Association,
    target: &ModelClass,
    target_ids: &[Value],
) -> Result<Vec<(Value, String, Value)>> {
    let Some(column) = association.association_counter_cache_column(owner) else {
        return Ok(Vec::new());
    };
    let join = association.join_table(owner, target);
    let afk = association_foreign_key(association)?;
    let sql = format!("SELECT COUNT(*) FROM {join} WHERE {afk} = ?");

    let mut counts = Vec::with_capacity(target_ids.len());
    for id in target_ids.iter().filter(|id| !id.is_null()) {
        let value = recount(session, target, id, &column, &sql, vec![id.clone()])?;
        counts.push((id.clone(), column.clone(), value));
    }
    Ok(counts)
}

/// Recompute the owner's `counter_cache` column.
fn refresh_owner_counter(
    session: &Session,
    owner: &mut Record,
    association: &Association,
    target: &ModelClass,
) -> Result<()> {
    let Some(column) = association.counter_cache_column() else {
        return Ok(());
    };
    let join = association.join_table(owner.class(), target);
    let sql = format!(
        "SELECT COUNT(*) FROM {join} WHERE {} = ?",
        association.foreign_key()
    );
    let params = vec![owner.id()];
    refresh_counter(session, owner, &column, &sql, params)
}

/// Delete every join row of a destroyed owner and fix the targets' counters.
pub(crate) fn purge_owner(
    session: &Session,
    owner: &mut Record,
    association: &Association,
    target: &ModelClass,
) -> Result<()> {
    if owner.is_persisted() {
        let join = association.join_table(owner.class(), target);
        let afk = association_foreign_key(association)?;
        let owner_id = owner.id();

        let (sql, params) = SelectBuilder::from(join.as_str())
            .columns(&[afk])
            .filter(Condition::eq(association.foreign_key(), owner_id.clone()))
            .build();
        let target_ids: Vec<Value> = session
            .select_rows(target, "Join Load", &sql, &params)?
            .iter()
            .filter_map(|row| row.get(afk).cloned())
            .collect();

        let delete = DeleteBuilder::from(join.as_str())
            .filter(Condition::eq(association.foreign_key(), owner_id));
        session.execute_delete(target, "Join Delete", &delete)?;
        refresh_target_counters(session, owner.class(), association, target, &target_ids)?;
    }
    owner.associations.insert(
        association.name().to_string(),
        AssociationTarget::Many(Vec::new()),
    );
    Ok(())
}

/// Access to a `has_and_belongs_to_many` collection of one record.
///
/// Links live in a join table holding the owner's and the target's keys.
/// Both sides must be saved before a link can be written.
pub struct HasAndBelongsToMany<'a> {
    session: &'a Session,
    owner: &'a mut Record,
    association: Arc<Association>,
    target: Arc<ModelClass>,
}

impl Session {
    /// The `has_and_belongs_to_many` association `name` of `owner`.
    pub fn has_and_belongs_to_many<'a>(
        &'a self,
        owner: &'a mut Record,
        name: &str,
    ) -> Result<HasAndBelongsToMany<'a>> {
        let (association, target) =
            resolve(self, owner, name, AssociationKind::HasAndBelongsToMany)?;
        Ok(HasAndBelongsToMany {
            session: self,
            owner,
            association,
            target,
        })
    }
}

impl<'a> HasAndBelongsToMany<'a> {
    /// The association declaration.
    pub fn association(&self) -> &Association {
        &self.association
    }

    /// Name of the join table.
    pub fn join_table(&self) -> String {
        self.association.join_table(self.owner.class(), &self.target)
    }

    fn load_if_needed(&mut self, reload: bool) -> Result<()> {
        if reload || !self.owner.is_loaded(self.association.name()) {
            let targets = load_all(self.session, self.owner, &self.association, &self.target)?;
            self.owner.associations.insert(
                self.association.name().to_string(),
                AssociationTarget::Many(targets),
            );
        }
        Ok(())
    }

    fn cached_mut(&mut self) -> Option<&mut Vec<Record>> {
        match self.owner.associations.get_mut(self.association.name()) {
            Some(AssociationTarget::Many(targets)) => Some(targets),
            _ => None,
        }
    }

    /// The targets, loaded on first access.
    pub fn all(&mut self) -> Result<&mut [Record]> {
        self.load_if_needed(false)?;
        Ok(self.cached_mut().map(Vec::as_mut_slice).unwrap_or_default())
    }

    /// Reload the targets from the database.
    pub fn reload(&mut self) -> Result<&mut [Record]> {
        self.load_if_needed(true)?;
        Ok(self.cached_mut().map(Vec::as_mut_slice).unwrap_or_default())
    }

    /// Number of linked targets; the cached collection when loaded.
    pub fn len(&mut self) -> Result<usize> {
        if let Some(targets) = self.cached_mut() {
            return Ok(targets.len());
        }
        if let Some(column) = self.association.counter_cache_column() {
            if let Some(n) = self.owner.get(&column).as_i64() {
                return Ok(n.max(0) as usize);
            }
        }
        Ok(self.count()?.max(0) as usize)
    }

    /// Whether nothing is linked.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// COUNT of the linked targets in the database.
    pub fn count(&self) -> Result<i64> {
        if self.owner.is_new_record() {
            return Ok(0);
        }
        let id = self.owner.id();
        let (sql, params) = match self.association.finder_sql() {
            Some(sql) => {
                let sql = format!("SELECT COUNT(*) FROM ({sql}) AS counted");
                let params = bind_all(&sql, &id);
                (sql, params)
            }
            None => joined_select(self.session, self.owner.class(), &self.association, &self.target, &id)?
                .build_count(),
        };
        Ok(self
            .session
            .select_value(&self.target, "Count", &sql, &params)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    /// One linked target by primary key.
    pub fn find(&self, id: impl Into<Value>) -> Result<Record> {
        let id = id.into();
        let not_found = || Error::not_found(self.target.name(), Some(id.to_string()));
        if self.owner.is_new_record() {
            return Err(not_found());
        }
        if self.association.finder_sql().is_some() {
            return load_all(self.session, self.owner, &self.association, &self.target)?
                .into_iter()
                .find(|t| t.id() == id)
                .ok_or_else(not_found);
        }
        let pk = format!("{}.{}", self.target.table_name(), self.target.primary_key());
        let select = joined_select(
            self.session,
            self.owner.class(),
            &self.association,
            &self.target,
            &self.owner.id(),
        )?
        .filter(Condition::eq(&pk, id.clone()));
        load_one(self.session, &self.target, select)?.ok_or_else(not_found)
    }

    /// Link `records` to the owner, saving new ones first.
    pub fn add(&mut self, records: impl IntoIterator<Item = Record>) -> Result<()> {
        if self.owner.is_new_record() {
            return Err(Error::association(format!(
                "cannot link {} to an unsaved {}; save it first",
                self.association.name(),
                self.owner.class().name()
            )));
        }
        let records: Vec<Record> = records.into_iter().collect();
        for record in &records {
            check_type(&self.association, &self.target, record)?;
        }
        let join = self.join_table();
        let afk = association_foreign_key(&self.association)?.to_string();
        let owner_id = self.owner.id();
        let owner_class = Arc::clone(self.owner.class());

        let (linked, counts) = self.session.transaction(|s| {
            let mut linked = Vec::with_capacity(records.len());
            for mut record in records {
                if record.is_new_record() {
                    s.save_strict(&mut record)?;
                }
                let target_id = record.id();
                match self.association.insert_sql() {
                    Some(sql) => {
                        let params = join_params(sql, &owner_id, &target_id);
                        s.execute_sql(&self.target, "Join Create", sql, &params)?;
                    }
                    None => {
                        let insert = InsertBuilder::into(join.as_str())
                            .value(self.association.foreign_key(), owner_id.clone())
                            .value(afk.as_str(), target_id);
                        s.execute_insert(&self.target, &insert)?;
                    }
                }
                linked.push(record);
            }
            refresh_owner_counter(s, self.owner, &self.association, &self.target)?;
            let ids: Vec<Value> = linked.iter().map(Record::id).collect();
            let counts =
                refresh_target_counters(s, &owner_class, &self.association, &self.target, &ids)?;
            Ok((linked, counts))
        })?;

        let mut linked = linked;
        apply_counts(&mut linked, &counts);
        if let Some(targets) = self.cached_mut() {
            apply_counts(targets, &counts);
            targets.extend(linked);
        }
        Ok(())
    }

    /// Unlink `records` from the owner. The target rows stay.
    pub fn remove<'r>(&mut self, records: impl IntoIterator<Item = &'r Record>) -> Result<()> {
        let records: Vec<&Record> = records.into_iter().collect();
        for record in &records {
            check_type(&self.association, &self.target, record)?;
        }
        let ids: Vec<Value> = records
            .iter()
            .filter(|r| r.is_persisted())
            .map(|r| r.id())
            .collect();
        self.unlink(&ids)?;

        if let Some(targets) = self.cached_mut() {
            targets.retain(|t| !records.iter().any(|r| t.same_record(r)));
        }
        Ok(())
    }

    /// Unlink every target.
    pub fn clear(&mut self) -> Result<()> {
        if self.owner.is_persisted() {
            let ids: Vec<Value> = if self.association.delete_sql().is_some() {
                self.load_if_needed(false)?;
                self.cached_mut()
                    .map(|targets| targets.iter().map(Record::id).collect())
                    .unwrap_or_default()
            } else {
                let join = self.join_table();
                let afk = association_foreign_key(&self.association)?;
                let (sql, params) = SelectBuilder::from(join.as_str())
                    .columns(&[afk])
                    .filter(Condition::eq(self.association.foreign_key(), self.owner.id()))
                    .build();
                self.session
                    .select_rows(&self.target, "Join Load", &sql, &params)?
                    .iter()
                    .filter_map(|row| row.get(afk).cloned())
                    .collect()
            };
            self.unlink(&ids)?;
        }
        self.owner.associations.insert(
            self.association.name().to_string(),
            AssociationTarget::Many(Vec::new()),
        );
        Ok(())
    }

    fn unlink(&mut self, ids: &[Value]) -> Result<()> {
        if ids.is_empty() || self.owner.is_new_record() {
            return Ok(());
        }
        let join = self.join_table();
        let afk = association_foreign_key(&self.association)?.to_string();
        let owner_id = self.owner.id();
        let owner_class = Arc::clone(self.owner.class());

        let counts = self.session.transaction(|s| {
            match self.association.delete_sql() {
                Some(sql) => {
                    for id in ids {
                        let params = join_params(sql, &owner_id, id);
                        s.execute_sql(&self.target, "Join Delete", sql, &params)?;
                    }
                }
                None => {
                    let delete = DeleteBuilder::from(join.as_str())
                        .filter(Condition::eq(self.association.foreign_key(), owner_id.clone()))
                        .filter(Condition::in_list(&afk, ids.iter().cloned()));
                    s.execute_delete(&self.target, "Join Delete", &delete)?;
                }
            }
            refresh_owner_counter(s, self.owner, &self.association, &self.target)?;
            refresh_target_counters(s, &owner_class, &self.association, &self.target, ids)
        })?;

        if let Some(targets) = self.cached_mut() {
            apply_counts(targets, &counts);
        }
        Ok(())
    }
}

/// Mirror recomputed target counters into loaded records.
fn apply_counts(records: &mut [Record], counts: &[(Value, String, Value)]) {
    for (id, column, value) in counts {
        for record in records.iter_mut().filter(|r| r.id() == *id) {
            record.write_clean(column, value.clone());
        }
    }
}
