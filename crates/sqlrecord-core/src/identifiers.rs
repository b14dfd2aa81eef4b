//! SQL identifier quoting.

/// Quote an identifier with double quotes, doubling embedded quotes.
///
/// A dotted name (`schema.table`) is quoted part by part.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Whether `name` can be used unquoted: ASCII letters, digits and `_`, not
/// starting with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("topics"), "\"topics\"");
        assert_eq!(quote_ident("main.topics"), "\"main\".\"topics\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_is_plain_identifier() {
        assert!(is_plain_identifier("firm_id"));
        assert!(is_plain_identifier("_private"));
        assert!(!is_plain_identifier("1st"));
        assert!(!is_plain_identifier("drop table"));
        assert!(!is_plain_identifier(""));
    }
}
