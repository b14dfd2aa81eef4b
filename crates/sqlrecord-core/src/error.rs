//! Error types for SQLRecord.
//!
//! Errors are grouped by how callers are expected to react:
//!
//! - **Configuration** errors are programming mistakes (unknown declaration
//!   option, missing adapter, unresolvable callback). They surface as soon as
//!   the offending declaration or call is made and are never retried.
//! - **Statement** errors wrap a backend failure together with the SQL that
//!   caused it.
//! - **Not found** errors come from finders by primary key.
//! - **Validation** errors carry the per-attribute messages of a record.
//! - **Aborted** errors are raised by callbacks to veto an operation; the
//!   enclosing transaction is rolled back.

use std::fmt;

use crate::validate::Errors;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all SQLRecord operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid declaration or setup.
    Config(ConfigError),
    /// A statement failed in the storage backend.
    Statement(StatementError),
    /// No row for the requested identity.
    NotFound(NotFoundError),
    /// A record failed validation.
    Validation(ValidationFailed),
    /// A callback vetoed the operation.
    Aborted(String),
    /// Attempt to modify a destroyed record.
    Frozen {
        /// Class of the frozen record.
        model: String,
    },
    /// Unknown attribute for a model.
    UnknownAttribute {
        /// Class name.
        model: String,
        /// Attribute name.
        attribute: String,
    },
    /// Association misuse at runtime (e.g. comparing against an unsaved record).
    Association(String),
    /// Any other error.
    Custom(String),
}

/// Kinds of configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// An option key outside the allow-list of a declaration.
    UnknownOption,
    /// The configuration names no adapter, or an unregistered one.
    AdapterNotFound,
    /// A connection was requested before `establish_connection`.
    ConnectionNotEstablished,
    /// A queued callback could not be resolved or may not be queued.
    InvalidCallback,
    /// A class name that is not registered.
    UnknownClass,
    /// An association name the class does not declare, or of another kind.
    UnknownAssociation,
    /// A value object requested with a type other than the declared one.
    TypeMismatch,
    /// Any other malformed declaration.
    InvalidDeclaration,
}

impl ConfigErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            ConfigErrorKind::UnknownOption => "unknown option",
            ConfigErrorKind::AdapterNotFound => "adapter not found",
            ConfigErrorKind::ConnectionNotEstablished => "connection not established",
            ConfigErrorKind::InvalidCallback => "invalid callback",
            ConfigErrorKind::UnknownClass => "unknown class",
            ConfigErrorKind::UnknownAssociation => "unknown association",
            ConfigErrorKind::TypeMismatch => "type mismatch",
            ConfigErrorKind::InvalidDeclaration => "invalid declaration",
        }
    }
}

/// A configuration error.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// What went wrong.
    pub kind: ConfigErrorKind,
    /// Details.
    pub message: String,
}

/// A failed statement, with the SQL that caused it.
#[derive(Debug)]
pub struct StatementError {
    /// The statement text.
    pub sql: String,
    /// Message from the backend.
    pub message: String,
    /// Underlying backend error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Lookup by identity found nothing.
#[derive(Debug, Clone)]
pub struct NotFoundError {
    /// Class that was searched.
    pub model: String,
    /// Identity that was requested, if any.
    pub id: Option<String>,
}

/// A record that did not pass validation.
#[derive(Debug, Clone)]
pub struct ValidationFailed {
    /// Class of the record.
    pub model: String,
    /// The accumulated messages.
    pub errors: Errors,
}

impl Error {
    /// Build a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Build a statement error from a backend error.
    pub fn statement<E>(sql: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Statement(StatementError {
            sql: sql.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        })
    }

    /// Build a not-found error.
    pub fn not_found(model: impl Into<String>, id: Option<String>) -> Self {
        Error::NotFound(NotFoundError {
            model: model.into(),
            id,
        })
    }

    /// Veto the current operation from a callback.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Error::Aborted(reason.into())
    }

    /// Build an association misuse error.
    pub fn association(message: impl Into<String>) -> Self {
        Error::Association(message.into())
    }

    /// Configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether a callback aborted the operation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    /// The SQL statement involved, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Statement(e) => Some(&e.sql),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error ({}): {}", e.kind.as_str(), e.message),
            Error::Statement(e) => write!(f, "{}: {}", e.message, e.sql),
            Error::NotFound(e) => match &e.id {
                Some(id) => write!(f, "couldn't find {} with id = {}", e.model, id),
                None => write!(f, "couldn't find {}", e.model),
            },
            Error::Validation(e) => write!(
                f,
                "{} is invalid: {}",
                e.model,
                e.errors.full_messages().join(", ")
            ),
            Error::Aborted(reason) => write!(f, "operation aborted by callback: {reason}"),
            Error::Frozen { model } => write!(f, "can't modify frozen {model}"),
            Error::UnknownAttribute { model, attribute } => {
                write!(f, "unknown attribute `{attribute}` for {model}")
            }
            Error::Association(msg) => write!(f, "association error: {msg}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Statement(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::config(ConfigErrorKind::InvalidDeclaration, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_keeps_message_and_sql() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::statement("SELECT 1", io);
        assert_eq!(err.to_string(), "disk on fire: SELECT 1");
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_kind() {
        let err = Error::config(ConfigErrorKind::UnknownOption, "nam");
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownOption));
        assert!(err.is_config());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("Topic", Some("42".to_string()));
        assert_eq!(err.to_string(), "couldn't find Topic with id = 42");
    }
}
