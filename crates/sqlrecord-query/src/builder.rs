//! Query builders for SELECT, INSERT, UPDATE and DELETE statements.
//!
//! Builders work on table and column names rather than typed models: the
//! mapping engine declares its classes at runtime. Every builder produces
//! `(sql, params)` with `?` placeholders and can run itself against any
//! [`Connection`].

use crate::clause::{Condition, Where, push_where};
use sqlrecord_core::{Connection, Result, Row, Value};

/// SELECT query builder.
///
/// # Example
///
/// ```
/// use sqlrecord_query::{Condition, SelectBuilder};
///
/// let (sql, params) = SelectBuilder::from("clients")
///     .filter(Condition::eq("firm_id", 1))
///     .order_by("id")
///     .limit(10)
///     .build();
///
/// assert_eq!(sql, "SELECT * FROM clients WHERE firm_id = ? ORDER BY id LIMIT 10");
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    joins: Vec<String>,
    where_clause: Where,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    /// Select from a table.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clause: Where::default(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    /// Select specific columns (defaults to `*`).
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Add a raw JOIN fragment, e.g. `"INNER JOIN t ON ..."`.
    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.joins.push(join.into());
        self
    }

    /// Add a WHERE condition (joined with AND).
    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_clause = self.where_clause.and(condition);
        self
    }

    /// Add a WHERE condition when one is given.
    pub fn filter_opt(self, condition: Option<Condition>) -> Self {
        match condition {
            Some(c) => self.filter(c),
            None => self,
        }
    }

    /// Set the ORDER BY fragment.
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        let order = order.into();
        self.order_by = if order.trim().is_empty() {
            None
        } else {
            Some(order)
        };
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the SELECT SQL and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        let mut params = Vec::new();
        self.push_from_tail(&mut sql, &mut params);

        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (sql, params)
    }

    /// Build `SELECT COUNT(*)` over the same FROM/JOIN/WHERE.
    pub fn build_count(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let mut params = Vec::new();
        self.push_from_tail(&mut sql, &mut params);
        (sql, params)
    }

    fn push_from_tail(&self, sql: &mut String, params: &mut Vec<Value>) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        push_where(sql, params, &self.where_clause);
    }

    /// Run the query and return all rows.
    pub fn all<C: Connection + ?Sized>(&self, conn: &C) -> Result<Vec<Row>> {
        let (sql, params) = self.build();
        conn.select_all(&sql, &params)
    }

    /// Run the query limited to one row.
    pub fn one<C: Connection + ?Sized>(&self, conn: &C) -> Result<Option<Row>> {
        let (sql, params) = self.clone().limit(1).build();
        conn.select_one(&sql, &params)
    }

    /// Count matching rows.
    pub fn count<C: Connection + ?Sized>(&self, conn: &C) -> Result<i64> {
        let (sql, params) = self.build_count();
        Ok(conn
            .select_value(&sql, &params)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }
}

/// INSERT query builder.
///
/// # Example
///
/// ```
/// use sqlrecord_query::InsertBuilder;
///
/// let (sql, params) = InsertBuilder::into("topics")
///     .value("title", "The First Topic")
///     .value("approved", true)
///     .build();
///
/// assert_eq!(sql, "INSERT INTO topics (title, approved) VALUES (?, ?)");
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Value)>,
}

impl InsertBuilder {
    /// Insert into a table.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    /// Add a column value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Add several column values.
    pub fn values<K: Into<String>>(mut self, values: impl IntoIterator<Item = (K, Value)>) -> Self {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Build the INSERT SQL and parameters.
    ///
    /// With no values this is `INSERT INTO t DEFAULT VALUES`.
    pub fn build(&self) -> (String, Vec<Value>) {
        if self.values.is_empty() {
            return (format!("INSERT INTO {} DEFAULT VALUES", self.table), Vec::new());
        }

        let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        );
        let params = self.values.iter().map(|(_, v)| v.clone()).collect();
        (sql, params)
    }

    /// Execute the INSERT and return the generated id.
    pub fn execute<C: Connection + ?Sized>(&self, conn: &C) -> Result<Option<i64>> {
        let (sql, params) = self.build();
        conn.insert(&sql, &params)
    }
}

/// A column assignment in an UPDATE.
#[derive(Debug, Clone)]
enum SetClause {
    Value { column: String, value: Value },
    Raw(Condition),
}

/// UPDATE query builder.
///
/// # Example
///
/// ```
/// use sqlrecord_query::{Condition, UpdateBuilder};
///
/// let (sql, params) = UpdateBuilder::table("topics")
///     .set("title", "Renamed")
///     .set_raw("replies_count = replies_count + 1")
///     .filter(Condition::eq("id", 1))
///     .build();
///
/// assert_eq!(
///     sql,
///     "UPDATE topics SET title = ?, replies_count = replies_count + 1 WHERE id = ?"
/// );
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<SetClause>,
    where_clause: Where,
}

impl UpdateBuilder {
    /// Update a table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            where_clause: Where::default(),
        }
    }

    /// Set a column to a value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push(SetClause::Value {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Add a raw assignment fragment, e.g. `"n = n + 1"`.
    pub fn set_raw(mut self, fragment: impl Into<String>) -> Self {
        self.sets
            .push(SetClause::Raw(Condition::raw(fragment, std::iter::empty())));
        self
    }

    /// Add a raw assignment fragment with parameters.
    pub fn set_raw_with(
        mut self,
        fragment: impl Into<String>,
        params: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.sets.push(SetClause::Raw(Condition::raw(fragment, params)));
        self
    }

    /// Add a WHERE condition (joined with AND).
    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_clause = self.where_clause.and(condition);
        self
    }

    /// Build the UPDATE SQL and parameters.
    ///
    /// Returns an empty statement when nothing is set.
    pub fn build(&self) -> (String, Vec<Value>) {
        if self.sets.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut params = Vec::new();
        let assignments: Vec<String> = self
            .sets
            .iter()
            .map(|set| match set {
                SetClause::Value { column, value } => {
                    params.push(value.clone());
                    format!("{column} = ?")
                }
                SetClause::Raw(fragment) => {
                    params.extend(fragment.params().iter().cloned());
                    fragment.sql().to_string()
                }
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        push_where(&mut sql, &mut params, &self.where_clause);
        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub fn execute<C: Connection + ?Sized>(&self, conn: &C) -> Result<u64> {
        let (sql, params) = self.build();
        if sql.is_empty() {
            return Ok(0);
        }
        conn.update(&sql, &params)
    }
}

/// DELETE query builder.
///
/// # Example
///
/// ```
/// use sqlrecord_query::{Condition, DeleteBuilder};
///
/// let (sql, _) = DeleteBuilder::from("clients")
///     .filter(Condition::eq("firm_id", 1))
///     .build();
///
/// assert_eq!(sql, "DELETE FROM clients WHERE firm_id = ?");
/// ```
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    where_clause: Where,
}

impl DeleteBuilder {
    /// Delete from a table.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: Where::default(),
        }
    }

    /// Add a WHERE condition (joined with AND).
    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_clause = self.where_clause.and(condition);
        self
    }

    /// Build the DELETE SQL and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut params = Vec::new();
        push_where(&mut sql, &mut params, &self.where_clause);
        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub fn execute<C: Connection + ?Sized>(&self, conn: &C) -> Result<u64> {
        let (sql, params) = self.build();
        conn.delete(&sql, &params)
    }
}

/// Query builder for raw SQL with parameter binding.
#[derive(Debug)]
pub struct QueryBuilder {
    sql: String,
    params: Vec<Value>,
}

impl QueryBuilder {
    /// Create a new query builder with the given SQL.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind a parameter value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Bind multiple parameter values.
    pub fn bind_all(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.params.extend(values);
        self
    }

    /// Get the SQL and parameters.
    pub fn build(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_defaults_to_star() {
        let (sql, params) = SelectBuilder::from("topics").build();
        assert_eq!(sql, "SELECT * FROM topics");
        assert!(params.is_empty());
    }

    #[test]
    fn test_select_with_join_and_conditions() {
        let (sql, params) = SelectBuilder::from("projects")
            .columns(&["projects.*"])
            .join("INNER JOIN developers_projects j ON projects.id = j.project_id")
            .filter(Condition::eq("j.developer_id", 1))
            .filter(Condition::raw("projects.name LIKE ?", [Value::from("Active%")]))
            .order_by("projects.name")
            .build();

        assert_eq!(
            sql,
            "SELECT projects.* FROM projects \
             INNER JOIN developers_projects j ON projects.id = j.project_id \
             WHERE (j.developer_id = ?) AND (projects.name LIKE ?) ORDER BY projects.name"
        );
        assert_eq!(params, vec![Value::Int(1), Value::from("Active%")]);
    }

    #[test]
    fn test_select_offset_without_limit() {
        let (sql, _) = SelectBuilder::from("topics").offset(5).build();
        assert_eq!(sql, "SELECT * FROM topics LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_select_blank_order_is_ignored() {
        let (sql, _) = SelectBuilder::from("topics").order_by("  ").build();
        assert_eq!(sql, "SELECT * FROM topics");
    }

    #[test]
    fn test_count_ignores_order_and_limit() {
        let (sql, params) = SelectBuilder::from("clients")
            .filter(Condition::eq("firm_id", 7))
            .order_by("id DESC")
            .limit(3)
            .build_count();
        assert_eq!(sql, "SELECT COUNT(*) FROM clients WHERE firm_id = ?");
        assert_eq!(params, vec![Value::Int(7)]);
    }

    #[test]
    fn test_insert_default_values() {
        let (sql, params) = InsertBuilder::into("topics").build();
        assert_eq!(sql, "INSERT INTO topics DEFAULT VALUES");
        assert!(params.is_empty());
    }

    #[test]
    fn test_update_without_sets_is_empty() {
        let (sql, params) = UpdateBuilder::table("topics")
            .filter(Condition::eq("id", 1))
            .build();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_update_raw_params_are_ordered() {
        let (sql, params) = UpdateBuilder::table("firms")
            .set_raw_with(
                "clients_count = (SELECT COUNT(*) FROM clients WHERE firm_id = ?)",
                [Value::Int(1)],
            )
            .filter(Condition::eq("id", 1))
            .build();
        assert_eq!(
            sql,
            "UPDATE firms SET clients_count = (SELECT COUNT(*) FROM clients WHERE firm_id = ?) \
             WHERE id = ?"
        );
        assert_eq!(params, vec![Value::Int(1), Value::Int(1)]);
    }

    #[test]
    fn test_delete_without_filter() {
        let (sql, _) = DeleteBuilder::from("developers_projects").build();
        assert_eq!(sql, "DELETE FROM developers_projects");
    }

    #[test]
    fn test_raw_query_builder() {
        let (sql, params) = QueryBuilder::new("SELECT * FROM topics WHERE id = ?")
            .bind(1)
            .build();
        assert_eq!(sql, "SELECT * FROM topics WHERE id = ?");
        assert_eq!(params, vec![Value::Int(1)]);
    }
}
