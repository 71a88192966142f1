//! Output-format clause handling for outgoing statements

use std::sync::OnceLock;

use regex::Regex;

/// Leading keywords of statements that never take a `FORMAT` clause
const NO_FORMAT_KEYWORDS: &[&str] = &[
    "INSERT", "DELETE", "CREATE", "ALTER", "DROP", "RENAME", "SYSTEM", "OPTIMIZE", "TRUNCATE",
    "ATTACH", "DETACH", "EXCHANGE", "KILL", "SET", "USE", "GRANT", "REVOKE",
];

fn format_clause_pattern() -> &'static Regex {
    static RE_FORMAT: OnceLock<Regex> = OnceLock::new();
    RE_FORMAT.get_or_init(|| Regex::new(r"(?i)\bFORMAT\s+(\w+)\s*;?$").expect("Invalid regex"))
}

/// First SQL keyword, upper-cased
fn leading_keyword(sql: &str) -> String {
    sql.trim_start_matches('(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Whether `sql` should get a `FORMAT` clause appended
pub fn needs_format(sql: &str) -> bool {
    let sql = sql.trim();
    if sql.is_empty() || format_clause_pattern().is_match(sql) {
        return false;
    }
    let keyword = leading_keyword(sql);
    !NO_FORMAT_KEYWORDS.contains(&keyword.as_str())
}

/// Format named by a trailing `FORMAT` clause already present in `sql`
pub fn explicit_format(sql: &str) -> Option<String> {
    format_clause_pattern()
        .captures(sql.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Format the response to `sql` will be in once `format` is applied
pub fn response_format(sql: &str, format: &str) -> Option<String> {
    if needs_format(sql) {
        Some(format.to_string())
    } else {
        explicit_format(sql)
    }
}

/// Trim `sql` and append ` FORMAT <format>` unless the statement already has
/// one or cannot take one
pub fn apply_format(sql: &str, format: &str) -> String {
    let trimmed = sql.trim();
    if needs_format(trimmed) {
        format!("{} FORMAT {}", trimmed.trim_end_matches(';').trim_end(), format)
    } else {
        trimmed.to_string()
    }
}
