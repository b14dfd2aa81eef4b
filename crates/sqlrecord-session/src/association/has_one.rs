use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value};

use super::{Association, AssociationKind, check_type, resolve};
use crate::class::ModelClass;
use crate::finders::load_one;
use crate::record::{AssociationTarget, Record};
use crate::session::Session;

/// Load the single target of a `has_one` association; `None` while the owner
/// is unsaved.
pub(crate) fn load_target(
    session: &Session,
    owner: &Record,
    association: &Association,
    target: &Arc<ModelClass>,
) -> Result<Option<Record>> {
    let id = owner.id();
    if owner.is_new_record() || id.is_null() {
        return Ok(None);
    }
    session.record_lazy_load(owner.class(), association.name());
    load_one(session, target, association.scoped_select(session, target, &id))
}

/// Access to a `has_one` association of one record.
///
/// The foreign key lives on the target. Assigning a new target saves it
/// (unless the owner is unsaved) and releases the previous one: it is
/// destroyed when the association is dependent, otherwise its key is set to
/// NULL.
pub struct HasOne<'a> {
    session: &'a Session,
    owner: &'a mut Record,
    association: Arc<Association>,
    target: Arc<ModelClass>,
}

impl Session {
    /// The `has_one` association `name` of `owner`.
    pub fn has_one<'a>(&'a self, owner: &'a mut Record, name: &str) -> Result<HasOne<'a>> {
        let (association, target) = resolve(self, owner, name, AssociationKind::HasOne)?;
        Ok(HasOne {
            session: self,
            owner,
            association,
            target,
        })
    }
}

impl<'a> HasOne<'a> {
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

    /// The associated record, loaded on first access.
    pub fn get(&mut self, reload: bool) -> Result<Option<&mut Record>> {
        if reload || !self.owner.is_loaded(self.association.name()) {
            let loaded = load_target(self.session, self.owner, &self.association, &self.target)?;
            self.cache(loaded);
        }
        match self.owner.associations.get_mut(self.association.name()) {
            Some(AssociationTarget::One(target)) => Ok(target.as_deref_mut()),
            _ => Ok(None),
        }
    }

    /// Replace the associated record.
    ///
    /// `None` only releases the current target.
    pub fn set(&mut self, target: Option<&mut Record>) -> Result<()> {
        if let Some(target) = target.as_deref() {
            check_type(&self.association, &self.target, target)?;
        }
        let session = self.session;
        let owner_id = self.owner.id();
        let owner_saved = !self.owner.is_new_record();
        let fk = self.association.foreign_key().to_string();

        let previous = self.get(false)?.map(|r| r.clone());
        session.transaction(|s| {
            if let Some(mut previous) = previous {
                let replaced = target.as_deref().is_some_and(|t| t.same_record(&previous));
                if !replaced && previous.is_persisted() {
                    if self.association.is_dependent() {
                        s.destroy(&mut previous)?;
                    } else {
                        previous.set(&fk, Value::Null)?;
                        s.save_strict(&mut previous)?;
                    }
                }
            }
            match target {
                Some(target) => {
                    if owner_saved {
                        target.set(&fk, owner_id.clone())?;
                        s.save_strict(target)?;
                    }
                    self.cache(Some(target.clone()));
                }
                None => self.cache(None),
            }
            Ok(())
        })
    }

    /// Whether an associated record exists.
    pub fn exists(&mut self) -> Result<bool> {
        Ok(self.get(false)?.is_some())
    }

    /// Build an unsaved target pointing at the owner and cache it.
    pub fn build<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Result<&mut Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut target = self.session.new_record(&self.target, attributes)?;
        target.set(self.association.foreign_key(), self.owner.id())?;
        self.cache(Some(target));
        self.cached()
    }

    /// Create a target pointing at the owner, replacing the current one.
    pub fn create<K, V>(
        &mut self,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Record>
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
        let mut target = self.session.new_record(&self.target, attributes)?;
        self.set(Some(&mut target))?;
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
