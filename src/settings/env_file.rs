//! Parser for the `KEY=VALUE` settings format shared by the local `.env` file
//! and the Secret Manager payload.
//!
//! Values may reference `$OTHER` keys defined earlier in the same payload.
//! Wrap a value in single quotes to keep a literal `$`.

use std::collections::BTreeMap;

/// Parse `KEY=VALUE` lines into an ordered map without touching the process
/// environment. Later duplicates win.
///
/// # Errors
/// Returns an error naming the offending line if the content is malformed.
pub fn parse(content: &str) -> Result<BTreeMap<String, String>, dotenvy::Error> {
    dotenvy::from_read_iter(content.as_bytes()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_pairs() {
        let values = parse("SECRET_KEY=abc\nDEBUG=True\n").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("SECRET_KEY"), Some(&"abc".to_string()));
        assert_eq!(values.get("DEBUG"), Some(&"True".to_string()));
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let values = parse("# header\n\n   \nEMAIL_PORT=587\n  # indented comment\n").unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("EMAIL_PORT"), Some(&"587".to_string()));
    }

    #[test]
    fn test_parse_export_prefix() {
        let values = parse("export EMAIL_HOST=smtp.example.com\n").unwrap();
        assert_eq!(
            values.get("EMAIL_HOST"),
            Some(&"smtp.example.com".to_string())
        );
    }

    #[test]
    fn test_parse_value_keeps_equals_signs() {
        let values = parse("DATABASE_URL=postgres://u:p@db:5432/app?sslmode=require\n").unwrap();
        assert_eq!(
            values.get("DATABASE_URL"),
            Some(&"postgres://u:p@db:5432/app?sslmode=require".to_string())
        );
    }

    #[test]
    fn test_parse_quoted_values() {
        let values = parse("A='lit # not a comment \\n'\nB=\"line1\\nline2 \\\"q\\\"\"\n").unwrap();
        assert_eq!(
            values.get("A"),
            Some(&"lit # not a comment \\n".to_string())
        );
        assert_eq!(values.get("B"), Some(&"line1\nline2 \"q\"".to_string()));
    }

    #[test]
    fn test_parse_quoted_value_with_inline_comment() {
        let values =
            parse("EMAIL_HOST_PASSWORD=\"pw\" # smtp password\nSECRET_KEY='k' # django\n").unwrap();
        assert_eq!(values.get("EMAIL_HOST_PASSWORD"), Some(&"pw".to_string()));
        assert_eq!(values.get("SECRET_KEY"), Some(&"k".to_string()));
    }

    #[test]
    fn test_parse_strips_inline_comment_on_unquoted() {
        let values = parse("EMAIL_USE_TLS=True # STARTTLS\nHASH=a#b\n").unwrap();
        assert_eq!(values.get("EMAIL_USE_TLS"), Some(&"True".to_string()));
        assert_eq!(values.get("HASH"), Some(&"a#b".to_string()));
    }

    #[test]
    fn test_parse_single_quotes_keep_dollar_signs() {
        let values = parse("SECRET_KEY='abc$def'\n").unwrap();
        assert_eq!(values.get("SECRET_KEY"), Some(&"abc$def".to_string()));
    }

    #[test]
    fn test_parse_rejects_invalid_lines() {
        let err = parse("GOOD=y\nnot an assignment\n").unwrap_err();
        assert!(err.to_string().contains("not an assignment"));
    }

    #[test]
    fn test_parse_empty_value_and_duplicates() {
        let values = parse("EMPTY=\nKEY=first\nKEY=second\n").unwrap();
        assert_eq!(values.get("EMPTY"), Some(&String::new()));
        assert_eq!(values.get("KEY"), Some(&"second".to_string()));
    }

    #[test]
    fn test_parse_crlf_lines() {
        let values = parse("A=1\r\nB=2\r\n").unwrap();
        assert_eq!(values.get("A"), Some(&"1".to_string()));
        assert_eq!(values.get("B"), Some(&"2".to_string()));
    }
}
