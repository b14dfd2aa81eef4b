//! WHERE clause fragments.

use sqlrecord_core::Value;

/// A single SQL condition with its bound parameters.
///
/// Conditions use `?` placeholders; the parameters are bound in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    sql: String,
    params: Vec<Value>,
}

impl Condition {
    /// A raw SQL fragment with parameters.
    pub fn raw(sql: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into_iter().collect(),
        }
    }

    /// `column = ?`, or `column IS NULL` for a NULL value.
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            Self::raw(format!("{column} IS NULL"), [])
        } else {
            Self::raw(format!("{column} = ?"), [value])
        }
    }

    /// `column <> ?`, or `column IS NOT NULL` for a NULL value.
    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            Self::raw(format!("{column} IS NOT NULL"), [])
        } else {
            Self::raw(format!("{column} <> ?"), [value])
        }
    }

    /// `column IN (?, ?, ...)`. An empty list matches nothing.
    pub fn in_list(column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            return Self::raw("1 = 0", []);
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        Self::raw(format!("{column} IN ({placeholders})"), values)
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Self::raw(sql, [])
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Self::raw(sql, [])
    }
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    conditions: Vec<Condition>,
}

impl Where {
    /// Start a clause from one condition.
    pub fn new(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    /// Add a condition joined with AND.
    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether no condition was added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Build the clause body (without the `WHERE` keyword).
    ///
    /// Each condition is parenthesized when more than one is present.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| {
                params.extend(c.params.iter().cloned());
                if self.conditions.len() > 1 {
                    format!("({})", c.sql)
                } else {
                    c.sql.clone()
                }
            })
            .collect();
        (parts.join(" AND "), params)
    }
}

/// Append an optional WHERE clause to `sql`.
pub(crate) fn push_where(sql: &mut String, params: &mut Vec<Value>, where_clause: &Where) {
    if where_clause.is_empty() {
        return;
    }
    let (where_sql, where_params) = where_clause.build();
    sql.push_str(" WHERE ");
    sql.push_str(&where_sql);
    params.extend(where_params);
}
