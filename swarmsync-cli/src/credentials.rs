//! Credential file parser
//!
//! A credential file is UTF-8 text with one `KEY=VALUE` assignment per line.
//! Every line is first classified; only assignments produce entries, all other
//! lines are skipped without error.

use crate::error::{ReadSourceSnafu, Result};
use regex::Regex;
use snafu::ResultExt;
use std::path::Path;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").expect("assignment regex is valid")
});

/// One `key = value` pair from a credential file
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub key: String,
    pub value: String,
}

impl CredentialEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Classification of a single source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Comment,
    Assignment { key: &'a str, value: &'a str },
    Unrecognized,
}

pub fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.starts_with('#') {
        return Line::Comment;
    }
    match ASSIGNMENT.captures(line) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(key), Some(value)) => Line::Assignment {
                key: key.as_str(),
                value: unquote(value.as_str()),
            },
            _ => Line::Unrecognized,
        },
        None => Line::Unrecognized,
    }
}

/// Strip at most one matching pair of surrounding quotes
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn parse_str(content: &str) -> Vec<CredentialEntry> {
    content
        .lines()
        .filter_map(|line| match classify(line) {
            Line::Assignment { key, value } => Some(CredentialEntry::new(key, value)),
            Line::Blank | Line::Comment | Line::Unrecognized => None,
        })
        .collect()
}

/// Parse a credential file; a missing file yields no entries
pub fn parse(path: &Path) -> Result<Vec<CredentialEntry>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_str(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).context(ReadSourceSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(classify("   \t"), Line::Blank);
        assert_eq!(classify("# comment"), Line::Comment);
        assert_eq!(classify("   # indented = comment"), Line::Comment);
        assert_eq!(
            classify("API_KEY = abc"),
            Line::Assignment {
                key: "API_KEY",
                value: "abc"
            }
        );
        assert_eq!(classify("export API_KEY=abc"), Line::Unrecognized);
        assert_eq!(classify("1BAD=x"), Line::Unrecognized);
        assert_eq!(classify("no equals sign"), Line::Unrecognized);
    }

    #[test]
    fn test_quotes_stripped_once() {
        assert_eq!(parse_str(r#"A="abc123""#), vec![CredentialEntry::new("A", "abc123")]);
        assert_eq!(parse_str("A='abc'"), vec![CredentialEntry::new("A", "abc")]);
        assert_eq!(parse_str(r#"A=""x"""#), vec![CredentialEntry::new("A", r#""x""#)]);
        // mismatched quotes are kept verbatim
        assert_eq!(parse_str(r#"A="abc'"#), vec![CredentialEntry::new("A", r#""abc'"#)]);
        assert_eq!(parse_str(r#"A=a"b"c"#), vec![CredentialEntry::new("A", r#"a"b"c"#)]);
        assert_eq!(parse_str(r#"A=""#), vec![CredentialEntry::new("A", "\"")]);
    }

    #[test]
    fn test_empty_and_equals_in_value() {
        let entries = parse_str("EMPTY=\nURL=postgres://u:p@h/db?sslmode=require\n");
        assert_eq!(
            entries,
            vec![
                CredentialEntry::new("EMPTY", ""),
                CredentialEntry::new("URL", "postgres://u:p@h/db?sslmode=require"),
            ]
        );
    }

    #[test]
    fn test_example_file() {
        let entries = parse_str("API_KEY=\"abc123\"\n# comment\n");
        assert_eq!(entries, vec![CredentialEntry::new("API_KEY", "abc123")]);
    }

    #[test]
    fn test_order_preserved_and_idempotent() {
        let content = "B=2\n\nA=1\ngarbage line\nC = ' 3 '\n";
        let first = parse_str(content);
        let second = parse_str(content);
        assert_eq!(first, second);
        let keys: Vec<_> = first.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["B", "A", "C"]);
        assert_eq!(first[2].value, " 3 ");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = parse(&dir.path().join(".env")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# db\nDB_PASSWORD='p@ss word'\r\nTOKEN=t").unwrap();
        let entries = parse(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                CredentialEntry::new("DB_PASSWORD", "p@ss word"),
                CredentialEntry::new("TOKEN", "t"),
            ]
        );
    }

    #[test]
    fn test_debug_redacts_value() {
        let entry = CredentialEntry::new("TOKEN", "hunter2");
        assert!(!format!("{entry:?}").contains("hunter2"));
    }
}
