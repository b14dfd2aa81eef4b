//! Class-level finders and bulk writes.

use std::sync::Arc;

use sqlrecord_core::{Error, Result, Value};
use sqlrecord_query::{Condition, SelectBuilder, UpdateBuilder};

use crate::class::ModelClass;
use crate::record::Record;
use crate::session::{ClassRef, Session};

/// Options for [`Session::find_all`] and [`Session::find_first`].
///
/// ```
/// use sqlrecord_session::FindOptions;
///
/// let options = FindOptions::new()
///     .conditions("approved = 1")
///     .order("written_on DESC")
///     .limit(10);
/// assert_eq!(options.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// WHERE condition.
    pub conditions: Option<Condition>,
    /// ORDER BY fragment.
    pub order: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Raw JOIN fragment; only the class's own columns are selected.
    pub joins: Option<String>,
}

impl FindOptions {
    /// No restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WHERE condition.
    pub fn conditions(mut self, conditions: impl Into<Condition>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    /// Set the ORDER BY fragment.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set a JOIN fragment.
    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    /// Apply the options to a SELECT over `table`.
    pub(crate) fn apply(self, mut select: SelectBuilder, table: &str) -> SelectBuilder {
        if let Some(joins) = self.joins {
            let all = format!("{table}.*");
            select = select.columns(&[all.as_str()]).join(joins);
        }
        select = select.filter_opt(self.conditions);
        if let Some(order) = self.order {
            select = select.order_by(order);
        }
        if let Some(limit) = self.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select = select.offset(offset);
        }
        select
    }
}

impl Session {
    /// Find a record by primary key.
    pub fn find(&self, class: impl ClassRef, id: impl Into<Value>) -> Result<Record> {
        let class = class.resolve(self)?;
        let id = id.into();
        let select = self
            .select_for(&class)
            .filter(Condition::eq(class.primary_key(), id.clone()))
            .limit(1);
        self.load(&class, &select)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(class.name(), Some(id.to_string())))
    }

    /// Find several records by primary key; every id must exist.
    pub fn find_many<I>(&self, class: impl ClassRef, ids: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let class = class.resolve(self)?;
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        let select = self
            .select_for(&class)
            .filter(Condition::in_list(class.primary_key(), ids.iter().cloned()))
            .order_by(class.primary_key());
        let records = self.load(&class, &select)?;

        let mut distinct: Vec<&Value> = Vec::with_capacity(ids.len());
        for id in &ids {
            if !distinct.contains(&id) {
                distinct.push(id);
            }
        }
        if records.len() < distinct.len() {
            let listed: Vec<String> = ids.iter().map(ToString::to_string).collect();
            return Err(Error::not_found(
                class.name(),
                Some(format!("({})", listed.join(", "))),
            ));
        }
        Ok(records)
    }

    /// All records matching `options`.
    pub fn find_all(&self, class: impl ClassRef, options: FindOptions) -> Result<Vec<Record>> {
        let class = class.resolve(self)?;
        let select = options.apply(self.select_for(&class), class.table_name());
        self.load(&class, &select)
    }

    /// The first record matching `options`.
    pub fn find_first(&self, class: impl ClassRef, options: FindOptions) -> Result<Option<Record>> {
        let class = class.resolve(self)?;
        let select = options
            .apply(self.select_for(&class), class.table_name())
            .limit(1);
        Ok(self.load(&class, &select)?.into_iter().next())
    }

    /// Materialize records from custom SQL.
    pub fn find_by_sql(
        &self,
        class: impl ClassRef,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        let class = class.resolve(self)?;
        let rows = self.select_rows(&class, "Load", sql, params)?;
        self.instantiate_all(&class, rows)
    }

    /// Number of records matching `conditions`.
    pub fn count(&self, class: impl ClassRef, conditions: Option<Condition>) -> Result<i64> {
        let class = class.resolve(self)?;
        let select = self.select_for(&class).filter_opt(conditions);
        self.count_rows(&class, &select)
    }

    /// Whether a record with this primary key exists.
    pub fn exists(&self, class: impl ClassRef, id: impl Into<Value>) -> Result<bool> {
        let class = class.resolve(self)?;
        let select = self
            .select_for(&class)
            .filter(Condition::eq(class.primary_key(), id.into()));
        Ok(self.count_rows(&class, &select)? > 0)
    }

    /// Run a raw SET fragment over matching rows, without callbacks.
    pub fn update_all(
        &self,
        class: impl ClassRef,
        updates: &str,
        conditions: Option<Condition>,
    ) -> Result<u64> {
        let class = class.resolve(self)?;
        let mut update = UpdateBuilder::table(class.table_name()).set_raw(updates);
        if let Some(scope) = self.inheritance_scope(&class) {
            update = update.filter(scope);
        }
        if let Some(conditions) = conditions {
            update = update.filter(conditions);
        }
        self.execute_update(&class, "Update all", &update)
    }

    /// Delete matching rows with one statement, without callbacks.
    pub fn delete_all(&self, class: impl ClassRef, conditions: Option<Condition>) -> Result<u64> {
        let class = class.resolve(self)?;
        let mut delete = self.delete_scope(&class);
        if let Some(conditions) = conditions {
            delete = delete.filter(conditions);
        }
        self.execute_delete(&class, "Delete all", &delete)
    }

    /// Load and destroy every matching record, running callbacks and
    /// cascades. Returns the number destroyed.
    pub fn destroy_all(&self, class: impl ClassRef, conditions: Option<Condition>) -> Result<usize> {
        let class = class.resolve(self)?;
        self.transaction(|s| {
            let select = s.select_for(&class).filter_opt(conditions);
            let records = s.load(&class, &select)?;
            let count = records.len();
            for mut record in records {
                s.destroy(&mut record)?;
            }
            Ok(count)
        })
    }

    /// Add one to a counter column of one row.
    pub fn increment_counter(
        &self,
        class: impl ClassRef,
        column: &str,
        id: impl Into<Value>,
    ) -> Result<u64> {
        let class = class.resolve(self)?;
        self.update_counter(&class, column, id.into(), 1)
    }

    /// Subtract one from a counter column of one row.
    pub fn decrement_counter(
        &self,
        class: impl ClassRef,
        column: &str,
        id: impl Into<Value>,
    ) -> Result<u64> {
        let class = class.resolve(self)?;
        self.update_counter(&class, column, id.into(), -1)
    }

    pub(crate) fn update_counter(
        &self,
        class: &ModelClass,
        column: &str,
        id: Value,
        delta: i64,
    ) -> Result<u64> {
        let update = UpdateBuilder::table(class.table_name())
            .set_raw_with(format!("{column} = COALESCE({column}, 0) + ?"), [Value::Int(delta)])
            .filter(Condition::eq(class.primary_key(), id));
        self.execute_update(class, "Update Counter", &update)
    }
}

/// Load helper for handles that already hold the class.
pub(crate) fn load_one(
    session: &Session,
    class: &Arc<ModelClass>,
    select: SelectBuilder,
) -> Result<Option<Record>> {
    Ok(session.load(class, &select.limit(1))?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joins_select_own_columns() {
        let select = FindOptions::new()
            .joins("INNER JOIN firms ON firms.id = clients.firm_id")
            .conditions(Condition::raw("firms.name = ?", [Value::from("37signals")]))
            .apply(SelectBuilder::from("clients"), "clients");
        let (sql, params) = select.build();
        assert_eq!(
            sql,
            "SELECT clients.* FROM clients INNER JOIN firms ON firms.id = clients.firm_id \
             WHERE firms.name = ?"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_order_limit_offset() {
        let (sql, _) = FindOptions::new()
            .order("id DESC")
            .limit(2)
            .offset(1)
            .apply(SelectBuilder::from("topics"), "topics")
            .build();
        assert_eq!(sql, "SELECT * FROM topics ORDER BY id DESC LIMIT 2 OFFSET 1");
    }
}
