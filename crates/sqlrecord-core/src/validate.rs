//! Validation support: per-attribute error collections and pattern helpers.
//!
//! Failed validations never raise. They are accumulated into an [`Errors`]
//! collection attached to the record so the caller can inspect and redisplay
//! them, then retry.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use indexmap::IndexMap;
use regex::Regex;

use crate::inflector;

/// Attribute key used for errors that concern the record as a whole.
pub const BASE: &str = "base";

/// Default validation messages.
pub mod messages {
    /// Presence failed.
    pub const EMPTY: &str = "can't be empty";
    /// Format failed.
    pub const INVALID: &str = "is invalid";
    /// Confirmation field differs.
    pub const CONFIRMATION: &str = "doesn't match confirmation";
    /// Acceptance flag not set.
    pub const ACCEPTED: &str = "must be accepted";
    /// Uniqueness failed.
    pub const TAKEN: &str = "has already been taken";
    /// Inclusion failed.
    pub const INCLUSION: &str = "is not included in the list";

    /// Value longer than allowed.
    pub fn too_long(max: usize) -> String {
        format!("is too long (max is {max} characters)")
    }

    /// Value shorter than allowed.
    pub fn too_short(min: usize) -> String {
        format!("is too short (min is {min} characters)")
    }

    /// Value not exactly the required length.
    pub fn wrong_length(len: usize) -> String {
        format!("is the wrong length (should be {len} characters)")
    }
}

/// Accumulated validation messages, keyed by attribute in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    entries: IndexMap<String, Vec<String>>,
}

impl Errors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message for an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.entries
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Add a message about the record as a whole.
    pub fn add_to_base(&mut self, message: impl Into<String>) {
        self.add(BASE, message);
    }

    /// Messages for an attribute (empty when it is valid).
    pub fn on(&self, attribute: &str) -> &[String] {
        self.entries.get(attribute).map_or(&[], Vec::as_slice)
    }

    /// Messages about the record as a whole.
    pub fn on_base(&self) -> &[String] {
        self.on(BASE)
    }

    /// Whether an attribute has at least one message.
    pub fn is_invalid(&self, attribute: &str) -> bool {
        !self.on(attribute).is_empty()
    }

    /// Whether no messages were recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Remove every message.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate `(attribute, message)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(attr, msgs)| msgs.iter().map(move |m| (attr.as_str(), m.as_str())))
    }

    /// Messages prefixed with the humanized attribute name.
    ///
    /// Base messages are returned as-is.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(attr, msg)| {
                if attr == BASE {
                    msg.to_string()
                } else {
                    format!("{} {}", inflector::humanize(attr), msg)
                }
            })
            .collect()
    }
}

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime of
/// the program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Returns `false` if the pattern is invalid (logs a warning). Patterns are
/// normally checked with [`validate_pattern`] when the validation is declared.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Validate a regex pattern at declaration time.
///
/// Returns an error message if the pattern is invalid, None if valid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_email_pattern() {
        let email_pattern = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

        assert!(matches_pattern("david@loudthinking.com", email_pattern));
        assert!(!matches_pattern("invalid", email_pattern));
        assert!(!matches_pattern("@example.com", email_pattern));
    }

    #[test]
    fn test_invalid_pattern_returns_false() {
        assert!(!matches_pattern("anything", r"[unclosed"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern(r"^\d{4}-\d{2}-\d{2}$").is_none());
        let result = validate_pattern(r"[unclosed");
        assert!(result.unwrap().contains("invalid regex pattern"));
    }

    #[test]
    fn test_errors_accumulate() {
        let mut errors = Errors::new();
        assert!(errors.is_empty());

        errors.add("title", messages::EMPTY);
        errors.add("title", messages::too_long(5));
        errors.add_to_base("Topic is locked");

        assert_eq!(errors.len(), 3);
        assert!(errors.is_invalid("title"));
        assert!(!errors.is_invalid("content"));
        assert_eq!(errors.on("title").len(), 2);
        assert_eq!(errors.on_base(), ["Topic is locked".to_string()]);
        assert_eq!(
            errors.full_messages(),
            vec![
                "Title can't be empty".to_string(),
                "Title is too long (max is 5 characters)".to_string(),
                "Topic is locked".to_string(),
            ]
        );

        errors.clear();
        assert!(errors.is_empty());
    }
}
