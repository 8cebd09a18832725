//! # Identifier Sanitization
//!
//! Every table that lands in a user's store is named through [`sanitize_identifier`],
//! and every identifier that is spliced into generated SQL goes through
//! [`quote_identifier`].

use regex::Regex;
use std::sync::LazyLock;

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static identifier pattern is valid"));

/// Normalizes an arbitrary name into a canonical identifier.
///
/// Each maximal run of characters outside `[A-Za-z0-9_]` becomes a single `_`,
/// the result is lowercased, and leading/trailing underscores are stripped.
///
/// The function is total: input made only of punctuation yields an empty string,
/// and callers must treat that as an error before using it as an identifier.
///
/// ```
/// use sqlchat::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("Game Sales 2020!"), "game_sales_2020");
/// assert_eq!(sanitize_identifier("!!!"), "");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    let replaced = NON_WORD_RUN.replace_all(name, "_");
    replaced.to_ascii_lowercase().trim_matches('_').to_string()
}

/// True for names SQLite keeps for its own objects (`sqlite_` prefix, any case).
pub fn is_reserved_identifier(name: &str) -> bool {
    name.get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"))
}

/// Renders `name` as a double-quoted SQLite identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize_identifier("Game Sales 2020!"), "game_sales_2020");
        assert_eq!(sanitize_identifier("teams"), "teams");
        assert_eq!(sanitize_identifier("  Olympic-Medals (v2) "), "olympic_medals_v2");
        assert_eq!(sanitize_identifier("__Already__Snake__"), "already__snake");
        assert_eq!(sanitize_identifier("ação"), "a_o");
    }

    #[test]
    fn test_sanitize_can_be_empty() {
        assert_eq!(sanitize_identifier(""), "");
        assert_eq!(sanitize_identifier("!!!"), "");
        assert_eq!(sanitize_identifier("___"), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Game Sales 2020!",
            "a--b__c",
            "  spaced  out  ",
            "_x_",
            "MiXeD.CaSe.Name",
            "日本語のテーブル",
            "tab\tand\nnewline",
            "",
        ];
        for input in inputs {
            let once = sanitize_identifier(input);
            assert_eq!(sanitize_identifier(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_reserved_prefix() {
        assert!(is_reserved_identifier("sqlite_export"));
        assert!(is_reserved_identifier("SQLite_Stats"));
        assert!(!is_reserved_identifier("sqlitedata"));
        assert!(!is_reserved_identifier("sqlite"));
        assert!(!is_reserved_identifier("my_sqlite_export"));
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("sales"), "\"sales\"");
        assert_eq!(quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
