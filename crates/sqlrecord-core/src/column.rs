//! Column metadata and type coercion.
//!
//! A [`Column`] describes one persisted field of a table as reported by the
//! storage backend. It owns the coercion rules between what the backend
//! stores (integers, floats, text) and the richer in-memory [`Value`]s.
//!
//! Coercion never fails. A malformed stored value degrades to a best-effort
//! fallback (zero, NULL or the raw string) so that loading a row can never
//! fail because of a single bad column.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::inflector;
use crate::types::SqlType;
use crate::value::Value;

/// Header marking a text value as a serialized structure.
pub const SERIALIZED_HEADER: &str = "--- ";

const ZERO_DATE: &str = "0000-00-00";
const ZERO_TIMESTAMP: &str = "0000-00-00 00:00:00";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Metadata about a table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Coarse type used for coercion.
    pub sql_type: SqlType,
    /// Type exactly as declared in the schema (e.g. `"varchar(255)"`).
    pub declared_type: String,
    /// Default as stored in the schema, before coercion.
    pub default: Option<Value>,
    /// Display size, when the declaration carries one.
    pub limit: Option<u32>,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column is (part of) the primary key.
    pub primary: bool,
}

impl Column {
    /// Create a column from its declared SQL type.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            sql_type: SqlType::from_declared(&declared_type),
            limit: SqlType::extract_limit(&declared_type),
            declared_type,
            default: None,
            nullable: true,
            primary: false,
        }
    }

    /// Set the raw schema default.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = if value.is_null() { None } else { Some(value) };
        self
    }

    /// Set nullability.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark as primary key.
    pub fn primary(mut self, value: bool) -> Self {
        self.primary = value;
        self
    }

    /// The default value coerced through [`Column::type_cast`].
    pub fn default_value(&self) -> Value {
        self.default
            .as_ref()
            .map_or(Value::Null, |raw| self.type_cast(raw))
    }

    /// Human readable name, used in validation messages.
    ///
    /// `"first_name"` becomes `"First name"`.
    pub fn human_name(&self) -> String {
        inflector::humanize(&self.name)
    }

    /// Whether this column holds numbers.
    pub fn is_number(&self) -> bool {
        self.sql_type.is_numeric()
    }

    /// Whether this column holds text.
    pub fn is_text(&self) -> bool {
        self.sql_type.is_textual()
    }

    /// Coerce a stored (or assigned) value into its in-memory representation.
    pub fn type_cast(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }

        match self.sql_type {
            SqlType::Integer => Value::Int(cast_integer(value)),
            SqlType::Float => Value::Float(cast_float(value)),
            SqlType::Boolean => Value::Bool(cast_boolean(value)),
            SqlType::Date => cast_date(value).map_or(Value::Null, Value::Date),
            SqlType::Timestamp => cast_timestamp(value).map_or(Value::Null, Value::Timestamp),
            SqlType::Time => cast_time(value).map_or(Value::Null, Value::Time),
            SqlType::Text | SqlType::String => match value {
                Value::Text(s) => unserialize(s),
                other => other.clone(),
            },
            SqlType::Binary => value.clone(),
        }
    }

    /// Convert an in-memory value into what the backend stores.
    pub fn to_storage(&self, value: &Value) -> Value {
        match (self.sql_type, value) {
            (SqlType::Integer, Value::Text(s)) => Value::Int(string_to_integer(s)),
            (SqlType::Float, Value::Text(s)) => Value::Float(string_to_float(s)),
            (SqlType::Boolean, Value::Text(_)) => Value::Bool(cast_boolean(value)),
            _ => storable(value),
        }
    }
}

/// Convert a rich value into one of the storage-level variants.
///
/// Drivers that only understand integers, floats, text and bytes use this to
/// bind parameters.
pub fn storable(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Date(_) | Value::Timestamp(_) | Value::Time(_) => Value::Text(value.to_string()),
        Value::Json(j) => Value::Text(format!("{SERIALIZED_HEADER}{j}")),
        other => other.clone(),
    }
}

/// Deserialize a text value carrying [`SERIALIZED_HEADER`].
///
/// Text without the header, or whose payload does not parse, comes back
/// unchanged.
pub fn unserialize(text: &str) -> Value {
    let Some(payload) = text.strip_prefix(SERIALIZED_HEADER) else {
        return Value::Text(text.to_string());
    };

    match serde_json::from_str(payload) {
        Ok(structure) => Value::Json(structure),
        Err(e) => {
            tracing::debug!(error = %e, "Serialized attribute did not parse, keeping raw text");
            Value::Text(text.to_string())
        }
    }
}

/// Parse the longest integer prefix of `s`; no numeric prefix yields `0`.
pub fn string_to_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut result: i64 = 0;
    let mut previous_digit = false;
    for c in digits.chars() {
        if c == '_' && previous_digit {
            previous_digit = false;
            continue;
        }
        let Some(digit) = c.to_digit(10) else {
            break;
        };
        result = result.saturating_mul(10).saturating_add(i64::from(digit));
        previous_digit = true;
    }

    if negative { -result } else { result }
}

/// Parse the longest float prefix of `s`; no numeric prefix yields `0.0`.
pub fn string_to_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
            has_digits = true;
        }
    }

    if !has_digits {
        return 0.0;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'-' | b'+') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(0.0)
}

/// Parse a date; the all-zero sentinel and unparseable text yield `None`.
pub fn string_to_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() || s.starts_with(ZERO_DATE) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| string_to_timestamp(s).map(|ts| ts.date()))
}

/// Parse a timestamp; the all-zero sentinel and unparseable text yield `None`.
///
/// A bare date is read as midnight of that day.
pub fn string_to_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() || s == ZERO_TIMESTAMP || s == ZERO_DATE {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a time of day, accepting full timestamps as well.
pub fn string_to_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .or_else(|| string_to_timestamp(s).map(|ts| ts.time()))
}

fn cast_integer(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => i64::from(*b),
        Value::Text(s) => string_to_integer(s),
        _ => 0,
    }
}

fn cast_float(value: &Value) -> f64 {
    match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Text(s) => string_to_float(s),
        _ => 0.0,
    }
}

fn cast_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Text(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "t" | "true" | "1" | "y" | "yes"
        ),
        _ => false,
    }
}

fn cast_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Timestamp(ts) => Some(ts.date()),
        Value::Text(s) => string_to_date(s),
        _ => None,
    }
}

fn cast_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Text(s) => string_to_timestamp(s),
        _ => None,
    }
}

fn cast_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::Timestamp(ts) => Some(ts.time()),
        Value::Text(s) => string_to_time(s),
        _ => None,
    }
}
