//! Coarse SQL type classification.
//!
//! Storage backends report column types as free-form declarations
//! (`"varchar(255)"`, `"INTEGER"`, `"datetime"`). The mapping engine only needs
//! a coarse category to decide how a stored value is coerced into memory.

/// Coarse type of a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SqlType {
    /// Whole numbers (`INTEGER`, `INT`, `BIGINT`, ...).
    Integer,
    /// Floating point and fixed point numbers.
    Float,
    /// Calendar date without a time component.
    Date,
    /// Date and time of day.
    Timestamp,
    /// Time of day without a date.
    Time,
    /// Long text (`TEXT`, `CLOB`). May hold serialized structures.
    Text,
    /// Short text (`VARCHAR`, `CHAR`). Unknown declarations also land here.
    #[default]
    String,
    /// Boolean flags.
    Boolean,
    /// Raw bytes (`BLOB`, `BINARY`).
    Binary,
}

impl SqlType {
    /// Classify a declared SQL type.
    ///
    /// Matching is case-insensitive and looks at the base type name only, so
    /// `"VARCHAR(255)"` and `"varchar"` classify identically.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        let lower = declared.trim().to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();

        if base.contains("bool") {
            SqlType::Boolean
        } else if base.contains("int") {
            SqlType::Integer
        } else if base.contains("float")
            || base.contains("double")
            || base.contains("real")
            || base.contains("decimal")
            || base.contains("numeric")
        {
            SqlType::Float
        } else if base.contains("datetime") || base.contains("timestamp") {
            SqlType::Timestamp
        } else if base == "date" {
            SqlType::Date
        } else if base == "time" {
            SqlType::Time
        } else if base.contains("blob") || base.contains("binary") || base.contains("bytea") {
            SqlType::Binary
        } else if base.contains("text") || base.contains("clob") {
            SqlType::Text
        } else {
            SqlType::String
        }
    }

    /// Extract the display size from a declaration like `varchar(255)`.
    #[must_use]
    pub fn extract_limit(declared: &str) -> Option<u32> {
        let start = declared.find('(')?;
        let end = declared[start..].find(')')? + start;
        declared[start + 1..end]
            .split(',')
            .next()
            .and_then(|n| n.trim().parse().ok())
    }

    /// Whether values of this type are numbers.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Float)
    }

    /// Whether values of this type are textual.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, SqlType::Text | SqlType::String)
    }

    /// Canonical SQL name, used when describing a column.
    #[must_use]
    pub const fn sql_name(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Float => "FLOAT",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "DATETIME",
            SqlType::Time => "TIME",
            SqlType::Text => "TEXT",
            SqlType::String => "VARCHAR",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Binary => "BLOB",
        }
    }
}
