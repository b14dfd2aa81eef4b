//! Declarative attribute validations.
//!
//! Validations are attached to a class with `ModelBuilder::validates` and run
//! on every save, before the `validate*` lifecycle hooks. Each one adds its
//! messages to the record's [`Errors`]; a record with any error is not saved.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use sqlrecord_core::validate::{matches_pattern, messages, validate_pattern};
use sqlrecord_core::{ConfigErrorKind, Error, Errors, Result, Value};
use sqlrecord_query::Condition;

use crate::record::Record;
use crate::session::Session;

/// Which saves a validation applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationContext {
    /// Every save.
    #[default]
    Save,
    /// Only the first save of a new record.
    Create,
    /// Only saves of persisted records.
    Update,
}

impl ValidationContext {
    fn applies(self, creating: bool) -> bool {
        match self {
            ValidationContext::Save => true,
            ValidationContext::Create => creating,
            ValidationContext::Update => !creating,
        }
    }
}

/// Custom per-attribute check used by [`Validation::each`].
pub type EachFn = Arc<dyn Fn(&Record, &str, &Value, &mut Errors) + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Presence,
    Format(String),
    Length {
        minimum: Option<usize>,
        maximum: Option<usize>,
        is: Option<usize>,
    },
    Confirmation,
    Acceptance(String),
    Uniqueness(Option<String>),
    Inclusion(Vec<Value>),
    Each(EachFn),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Presence => f.write_str("Presence"),
            Rule::Format(pattern) => f.debug_tuple("Format").field(pattern).finish(),
            Rule::Length { minimum, maximum, is } => f
                .debug_struct("Length")
                .field("minimum", minimum)
                .field("maximum", maximum)
                .field("is", is)
                .finish(),
            Rule::Confirmation => f.write_str("Confirmation"),
            Rule::Acceptance(accept) => f.debug_tuple("Acceptance").field(accept).finish(),
            Rule::Uniqueness(scope) => f.debug_tuple("Uniqueness").field(scope).finish(),
            Rule::Inclusion(values) => f.debug_tuple("Inclusion").field(values).finish(),
            Rule::Each(_) => f.write_str("Each(..)"),
        }
    }
}

/// One validation rule over one or more attributes.
///
/// ```ignore
/// ModelBuilder::new("Topic")
///     .validates(Validation::presence_of(&["title", "content"]))?
///     .validates(Validation::length_of(&["title"]).maximum(255).allow_nil(true))?
///     .validates(Validation::uniqueness_of(&["title"]).on(ValidationContext::Create))?
/// ```
#[derive(Debug, Clone)]
pub struct Validation {
    rule: Rule,
    attributes: Vec<String>,
    on: ValidationContext,
    message: Option<String>,
    allow_nil: bool,
}

impl Validation {
    fn new(rule: Rule, attributes: &[&str]) -> Self {
        Self {
            rule,
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            on: ValidationContext::Save,
            message: None,
            allow_nil: false,
        }
    }

    /// The attributes must not be blank.
    pub fn presence_of(attributes: &[&str]) -> Self {
        Self::new(Rule::Presence, attributes)
    }

    /// The attributes, as text, must match a regular expression.
    pub fn format_of(attributes: &[&str], pattern: impl Into<String>) -> Self {
        Self::new(Rule::Format(pattern.into()), attributes)
    }

    /// Bound the length of the attributes; combine with
    /// [`minimum`](Self::minimum), [`maximum`](Self::maximum),
    /// [`within`](Self::within) or [`is`](Self::is).
    pub fn length_of(attributes: &[&str]) -> Self {
        Self::new(
            Rule::Length {
                minimum: None,
                maximum: None,
                is: None,
            },
            attributes,
        )
    }

    /// Each attribute must equal its `<attribute>_confirmation` virtual
    /// attribute, when that one is set.
    pub fn confirmation_of(attributes: &[&str]) -> Self {
        Self::new(Rule::Confirmation, attributes)
    }

    /// The attributes must equal `"1"` when set (terms of service checkboxes).
    pub fn acceptance_of(attributes: &[&str]) -> Self {
        Self::new(Rule::Acceptance("1".to_string()), attributes)
    }

    /// No other row of the table may hold the same value.
    pub fn uniqueness_of(attributes: &[&str]) -> Self {
        Self::new(Rule::Uniqueness(None), attributes)
    }

    /// The attributes must be one of `values`.
    pub fn inclusion_of(attributes: &[&str], values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(Rule::Inclusion(values.into_iter().collect()), attributes)
    }

    /// Run a closure for every attribute.
    pub fn each<F>(attributes: &[&str], f: F) -> Self
    where
        F: Fn(&Record, &str, &Value, &mut Errors) + Send + Sync + 'static,
    {
        Self::new(Rule::Each(Arc::new(f)), attributes)
    }

    /// Restrict to creates or updates.
    pub fn on(mut self, context: ValidationContext) -> Self {
        self.on = context;
        self
    }

    /// Replace the default message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Skip NULL values.
    pub fn allow_nil(mut self, allow: bool) -> Self {
        self.allow_nil = allow;
        self
    }

    /// Minimum length.
    pub fn minimum(mut self, n: usize) -> Self {
        if let Rule::Length { minimum, .. } = &mut self.rule {
            *minimum = Some(n);
        }
        self
    }

    /// Maximum length.
    pub fn maximum(mut self, n: usize) -> Self {
        if let Rule::Length { maximum, .. } = &mut self.rule {
            *maximum = Some(n);
        }
        self
    }

    /// Length range, inclusive.
    pub fn within(self, min: usize, max: usize) -> Self {
        self.minimum(min).maximum(max)
    }

    /// Exact length.
    pub fn is(mut self, n: usize) -> Self {
        if let Rule::Length { is, .. } = &mut self.rule {
            *is = Some(n);
        }
        self
    }

    /// Value that counts as accepted.
    pub fn accept(mut self, value: impl Into<String>) -> Self {
        if let Rule::Acceptance(accept) = &mut self.rule {
            *accept = value.into();
        }
        self
    }

    /// Only rows sharing this column's value conflict.
    pub fn scope(mut self, column: impl Into<String>) -> Self {
        if let Rule::Uniqueness(scope) = &mut self.rule {
            *scope = Some(column.into());
        }
        self
    }

    /// Validated attributes.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Names of virtual attributes this rule reads besides its own.
    pub(crate) fn virtual_attributes(&self) -> Vec<String> {
        match self.rule {
            Rule::Confirmation => self
                .attributes
                .iter()
                .map(|a| format!("{a}_confirmation"))
                .collect(),
            Rule::Acceptance(_) => self.attributes.clone(),
            _ => Vec::new(),
        }
    }

    /// Reject malformed declarations.
    pub(crate) fn check_declaration(&self, model: &str) -> Result<()> {
        if let Rule::Format(pattern) = &self.rule {
            if let Some(message) = validate_pattern(pattern) {
                return Err(Error::config(
                    ConfigErrorKind::InvalidDeclaration,
                    format!("{model}: {message}"),
                ));
            }
        }
        if self.attributes.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::InvalidDeclaration,
                format!("{model}: validation declared without attributes"),
            ));
        }
        Ok(())
    }

    /// Run the rule against a record, collecting messages into `errors`.
    pub(crate) fn run(
        &self,
        session: &Session,
        record: &Record,
        creating: bool,
        errors: &mut Errors,
    ) -> Result<()> {
        if !self.on.applies(creating) {
            return Ok(());
        }

        for attribute in &self.attributes {
            let value = record.get(attribute);
            if self.allow_nil && value.is_null() {
                continue;
            }
            self.check(session, record, attribute, value, errors)?;
        }
        Ok(())
    }

    fn check(
        &self,
        session: &Session,
        record: &Record,
        attribute: &str,
        value: &Value,
        errors: &mut Errors,
    ) -> Result<()> {
        let message = |default: String| self.message.clone().unwrap_or(default);

        match &self.rule {
            Rule::Presence => {
                if value.is_blank() {
                    errors.add(attribute, message(messages::EMPTY.to_string()));
                }
            }
            Rule::Format(pattern) => {
                if !matches_pattern(&value.to_string(), pattern) {
                    errors.add(attribute, message(messages::INVALID.to_string()));
                }
            }
            Rule::Length { minimum, maximum, is } => {
                let len = if value.is_null() {
                    0
                } else {
                    value.to_string().chars().count()
                };
                if let Some(n) = is.filter(|n| len != *n) {
                    errors.add(attribute, message(messages::wrong_length(n)));
                } else if let Some(n) = minimum.filter(|n| len < *n) {
                    errors.add(attribute, message(messages::too_short(n)));
                } else if let Some(n) = maximum.filter(|n| len > *n) {
                    errors.add(attribute, message(messages::too_long(n)));
                }
            }
            Rule::Confirmation => {
                let confirmation = record.get(&format!("{attribute}_confirmation"));
                if !confirmation.is_null() && confirmation.to_string() != value.to_string() {
                    errors.add(attribute, message(messages::CONFIRMATION.to_string()));
                }
            }
            Rule::Acceptance(accept) => {
                if !value.is_null() && value.to_string() != *accept {
                    errors.add(attribute, message(messages::ACCEPTED.to_string()));
                }
            }
            Rule::Uniqueness(scope) => {
                let class = record.class();
                let mut select = session
                    .select_for(class.base_class())
                    .filter(Condition::eq(attribute, value.clone()));
                if let Some(scope) = scope {
                    select = select.filter(Condition::eq(scope, record.get(scope).clone()));
                }
                if !record.is_new_record() {
                    select = select.filter(Condition::ne(class.primary_key(), record.id()));
                }
                if session.count_rows(class, &select)? > 0 {
                    errors.add(attribute, message(messages::TAKEN.to_string()));
                }
            }
            Rule::Inclusion(values) => {
                if !values.contains(value) {
                    errors.add(attribute, message(messages::INCLUSION.to_string()));
                }
            }
            Rule::Each(f) => f(record, attribute, value, errors),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts() {
        assert!(ValidationContext::Save.applies(true));
        assert!(ValidationContext::Save.applies(false));
        assert!(ValidationContext::Create.applies(true));
        assert!(!ValidationContext::Create.applies(false));
        assert!(ValidationContext::Update.applies(false));
    }

    #[test]
    fn test_bad_pattern_rejected_at_declaration() {
        let err = Validation::format_of(&["title"], "(unclosed")
            .check_declaration("Topic")
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidDeclaration));
    }

    #[test]
    fn test_empty_attribute_list_rejected() {
        assert!(Validation::presence_of(&[]).check_declaration("Topic").is_err());
    }

    #[test]
    fn test_virtual_attributes() {
        assert_eq!(
            Validation::confirmation_of(&["password"]).virtual_attributes(),
            ["password_confirmation"]
        );
        assert_eq!(
            Validation::acceptance_of(&["terms_of_service"]).virtual_attributes(),
            ["terms_of_service"]
        );
        assert!(Validation::presence_of(&["title"]).virtual_attributes().is_empty());
    }

    #[test]
    fn test_length_modifiers_only_touch_length_rules() {
        let v = Validation::presence_of(&["title"]).maximum(3);
        assert!(matches!(v.rule, Rule::Presence));

        let v = Validation::length_of(&["title"]).within(2, 5);
        assert!(matches!(
            v.rule,
            Rule::Length {
                minimum: Some(2),
                maximum: Some(5),
                is: None
            }
        ));
    }
}
