use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value};
use sqlrecord_query::Condition;

use super::{Association, AssociationKind, check_type, resolve};
use crate::class::ModelClass;
use crate::finders::load_one;
use crate::record::{AssociationTarget, Record};
use crate::session::Session;

/// Access to a `belongs_to` association of one record.
///
/// The foreign key lives on the owner. Assigning a persisted target writes
/// the key immediately; an unsaved target is saved together with the owner.
pub struct BelongsTo<'a> {
    session: &'a Session,
    owner: &'a mut Record,
    association: Arc<Association>,
    target: Arc<ModelClass>,
}

impl Session {
    /// The `belongs_to` association `name` of `owner`.
    pub fn belongs_to<'a>(&'a self, owner: &'a mut Record, name: &str) -> Result<BelongsTo<'a>> {
        let (association, target) = resolve(self, owner, name, AssociationKind::BelongsTo)?;
        Ok(BelongsTo {
            session: self,
            owner,
            association,
            target,
        })
    }
}

impl<'a> BelongsTo<'a> {
    /// The association declaration.
    pub fn association(&self) -> &Association {
        &self.association
    }

    fn cache(&mut self, target: Option<Record>) {
        self.owner.associations.insert(
            self.association.name().to_string(),
            AssociationTarget::One(target.map(Box::new)),
        );
    }

    /// The associated record, loaded on first access. `reload` forces a new
    /// query.
    pub fn get(&mut self, reload: bool) -> Result<Option<&mut Record>> {
        if reload || !self.owner.is_loaded(self.association.name()) {
            let loaded = self.load()?;
            self.cache(loaded);
        }
        match self.owner.associations.get_mut(self.association.name()) {
            Some(AssociationTarget::One(target)) => Ok(target.as_deref_mut()),
            _ => Ok(None),
        }
    }

    fn load(&self) -> Result<Option<Record>> {
        let id = self.owner.get(self.association.foreign_key()).clone();
        if id.is_null() {
            return Ok(None);
        }
        self.session
            .record_lazy_load(self.owner.class(), self.association.name());
        let select = self
            .session
            .select_for(&self.target)
            .filter(Condition::eq(self.target.primary_key(), id))
            .filter_opt(self.association.conditions_clause());
        load_one(self.session, &self.target, select)
    }

    /// Point the owner at `target`, or clear the reference with `None`.
    ///
    /// The owner itself is not saved.
    pub fn set(&mut self, target: Option<&Record>) -> Result<()> {
        let fk = self.association.foreign_key().to_string();
        match target {
            None => {
                self.owner.set(&fk, Value::Null)?;
                self.cache(None);
            }
            Some(target) => {
                check_type(&self.association, &self.target, target)?;
                let id = if target.is_new_record() {
                    Value::Null
                } else {
                    target.id()
                };
                self.owner.set(&fk, id)?;
                self.cache(Some(target.clone()));
            }
        }
        Ok(())
    }

    /// Whether `candidate` is the associated record.
    pub fn is(&mut self, candidate: &Record) -> Result<bool> {
        if candidate.is_new_record() {
            return Err(Error::association(format!(
                "cannot compare association {} with an unsaved {}",
                self.association.name(),
                candidate.class().name()
            )));
        }
        Ok(self
            .get(false)?
            .is_some_and(|target| target.same_record(candidate)))
    }

    /// Whether an associated record exists.
    pub fn exists(&mut self) -> Result<bool> {
        Ok(self.get(false)?.is_some())
    }

    /// Build an unsaved target and assign it; it is saved with the owner.
    pub fn build<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Result<&mut Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let target = self.session.new_record(&self.target, attributes)?;
        self.set(Some(&target))?;
        self.cached()
    }

    /// Create the target and point the owner at it.
    pub fn create<K, V>(
        &mut self,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let target = self.session.create_strict(&self.target, attributes)?;
        self.set(Some(&target))?;
        self.cached()
    }

    fn cached(&mut self) -> Result<&mut Record> {
        match self.owner.associations.get_mut(self.association.name()) {
            Some(AssociationTarget::One(Some(target))) => Ok(&mut **target),
            _ => Err(Error::association(format!(
                "association {} has no target",
                self.association.name()
            ))),
        }
    }
}
