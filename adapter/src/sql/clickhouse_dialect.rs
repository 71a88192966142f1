//! ClickHouse SQL dialect implementation

use std::sync::OnceLock;

use regex::Regex;

use super::SqlDialect;
use crate::types::quote_identifier;

fn plain_identifier() -> &'static Regex {
    static RE_IDENT: OnceLock<Regex> = OnceLock::new();
    RE_IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex"))
}

/// ClickHouse SQL dialect
pub struct ClickhouseDialect;

impl SqlDialect for ClickhouseDialect {
    fn identifier(&self, name: &str) -> String {
        if plain_identifier().is_match(name) {
            name.to_string()
        } else {
            quote_identifier(name)
        }
    }

    fn like_operator(&self, case_sensitive: bool, negated: bool) -> &'static str {
        match (case_sensitive, negated) {
            (true, false) => "LIKE",
            (true, true) => "NOT LIKE",
            (false, false) => "ILIKE",
            (false, true) => "NOT ILIKE",
        }
    }

    fn merge_aggregate(&self, function: &str) -> String {
        if function.ends_with("Merge") {
            function.to_string()
        } else {
            format!("{}Merge", function)
        }
    }

    fn count_star(&self) -> &'static str {
        // ClickHouse counts rows with an empty argument list
        "count()"
    }

    fn order_by_with_nulls(&self, col: &str, desc: bool, nulls_last: Option<bool>) -> String {
        let dir = if desc { "DESC" } else { "ASC" };
        match nulls_last {
            Some(true) => format!("{} {} NULLS LAST", col, dir),
            Some(false) => format!("{} {} NULLS FIRST", col, dir),
            None => format!("{} {}", col, dir),
        }
    }
}
