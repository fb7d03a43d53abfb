use std::collections::BTreeMap;

use crate::{Error, Result};

/// Message properties: unique keys, string values.
pub type Properties = BTreeMap<String, String>;

/// Parse the `KEY = value` text a job declares its message properties with.
///
/// One property per line. Blank lines and lines starting with `#` or `!` are
/// skipped. The first `=` or `:` separates key from value, and both are
/// trimmed. Later duplicates replace earlier ones.
pub fn parse_properties(text: &str) -> Result<Properties> {
    let mut properties = Properties::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let invalid = || Error::InvalidProperty {
            line: index + 1,
            text: line.into(),
        };
        let (key, value) = line
            .split_once(['=', ':'])
            .ok_or_else(invalid)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid());
        }
        properties.insert(key.to_string(), value.trim().to_string());
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_property() {
        let props = parse_properties("CI_STATUS = failed").unwrap();
        assert_eq!(props.get("CI_STATUS").map(String::as_str), Some("failed"));
    }

    #[test]
    fn test_value_keeps_inner_spaces_and_separators() {
        let props = parse_properties("PARAMETER = my parameter\nURL=http://host:8080/a=b").unwrap();
        assert_eq!(props["PARAMETER"], "my parameter");
        assert_eq!(props["URL"], "http://host:8080/a=b");
    }

    #[test]
    fn test_colon_separator() {
        let props = parse_properties("BRANCH: main").unwrap();
        assert_eq!(props["BRANCH"], "main");
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let text = "# comment\n\n! another\nA = 1\n   \nB = 2\n";
        let props = parse_properties(text).unwrap();
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let props = parse_properties("A = 1\nA = 2").unwrap();
        assert_eq!(props["A"], "2");
    }

    #[test]
    fn test_empty_value_allowed() {
        let props = parse_properties("A =").unwrap();
        assert_eq!(props["A"], "");
    }

    #[test]
    fn test_line_without_separator_rejected() {
        let err = parse_properties("A = 1\njust text").unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { line: 2, .. }));
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = parse_properties(" = value").unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { line: 1, .. }));
    }
}
