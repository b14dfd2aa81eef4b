use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use sqlrecord_core::Value;
use sqlrecord_core::column::storable;

/// Binds a core [`Value`] as a SQLite parameter.
#[derive(Debug)]
pub(crate) struct Param<'a>(pub(crate) &'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(&v[..])),
            // Booleans, dates and structured values go through the shared
            // lowering so every driver stores them the same way.
            other => ToSqlOutput::Owned(match storable(other) {
                Value::Int(v) => SqlValue::Integer(v),
                Value::Float(v) => SqlValue::Real(v),
                Value::Text(v) => SqlValue::Text(v),
                Value::Bytes(v) => SqlValue::Blob(v),
                _ => SqlValue::Null,
            }),
        })
    }
}

/// Converts a SQLite value within a row into a core value.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Bytes(v.to_vec()),
    }
}

/// Parses the `dflt_value` column of `PRAGMA table_info`.
///
/// SQLite reports defaults as SQL literals: `'text'`, `0`, `1.5`, `NULL`, or
/// an expression such as `CURRENT_TIMESTAMP`, which is kept verbatim.
pub(crate) fn parse_default(literal: Option<&str>) -> Value {
    let Some(literal) = literal.map(str::trim) else {
        return Value::Null;
    };
    if literal.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Some(inner) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Value::Text(inner.replace("''", "'"));
    }
    if let Ok(i) = literal.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = literal.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Text(literal.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_literals() {
        assert_eq!(parse_default(None), Value::Null);
        assert_eq!(parse_default(Some("NULL")), Value::Null);
        assert_eq!(parse_default(Some("0")), Value::Int(0));
        assert_eq!(parse_default(Some("2.5")), Value::Float(2.5));
        assert_eq!(parse_default(Some("'it''s'")), Value::from("it's"));
        assert_eq!(
            parse_default(Some("CURRENT_TIMESTAMP")),
            Value::from("CURRENT_TIMESTAMP")
        );
    }

    #[test]
    fn test_bool_param_lowers_to_integer() {
        let value = Value::Bool(true);
        let param = Param(&value);
        let out = param.to_sql().unwrap();
        assert_eq!(out, ToSqlOutput::Owned(SqlValue::Integer(1)));
    }
}
