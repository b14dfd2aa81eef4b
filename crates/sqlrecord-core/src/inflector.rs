//! Naming conventions: class names, table names, foreign keys.

use heck::{ToSnakeCase, ToUpperCamelCase};

/// `"FirmClient"` → `"firm_client"`.
pub fn underscore(word: &str) -> String {
    word.to_snake_case()
}

/// `"firm_client"` → `"FirmClient"`.
pub fn camelize(word: &str) -> String {
    word.to_upper_camel_case()
}

/// Pluralize the last `_`-separated segment of `word`.
pub fn pluralize(word: &str) -> String {
    map_last_segment(word, |w| pluralizer::pluralize(w, 2, false))
}

/// Singularize the last `_`-separated segment of `word`.
pub fn singularize(word: &str) -> String {
    map_last_segment(word, |w| pluralizer::pluralize(w, 1, false))
}

/// `"FirmClient"` → `"firm_clients"`.
pub fn tableize(class_name: &str) -> String {
    pluralize(&underscore(class_name))
}

/// `"firm_clients"` → `"FirmClient"`.
pub fn classify(table_name: &str) -> String {
    camelize(&singularize(table_name))
}

/// `"Firm"` → `"firm_id"`.
pub fn foreign_key(class_name: &str) -> String {
    format!("{}_id", underscore(class_name))
}

/// `"first_name"` → `"First name"`, `"firm_id"` → `"Firm"`.
pub fn humanize(attribute: &str) -> String {
    let base = attribute.strip_suffix("_id").unwrap_or(attribute);
    let spaced = base.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn map_last_segment(word: &str, f: impl FnOnce(&str) -> String) -> String {
    match word.rfind('_') {
        Some(idx) if idx + 1 < word.len() => format!("{}{}", &word[..=idx], f(&word[idx + 1..])),
        _ => f(word),
    }
}
