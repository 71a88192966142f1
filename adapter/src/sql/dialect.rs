//! SQL dialect trait
//!
//! The visitor walks the query tree; the dialect owns the leaf-level syntax
//! (quoting, operators, function-name rewrites, clause spelling).

use crate::types::Value;

/// Leaf-level SQL syntax used by the visitor
pub trait SqlDialect: Send + Sync {
    /// Identifier as it should appear in SQL, quoted only when it has to be
    fn identifier(&self, name: &str) -> String;

    /// Literal for a host value
    fn literal(&self, value: &Value) -> String {
        value.to_sql_literal()
    }

    /// Pattern-match operator
    ///
    /// - case-sensitive: `LIKE` / `NOT LIKE`
    /// - case-insensitive: `ILIKE` / `NOT ILIKE`
    fn like_operator(&self, case_sensitive: bool, negated: bool) -> &'static str;

    /// Aggregate name applied to stored aggregate states (`sum` -> `sumMerge`)
    fn merge_aggregate(&self, function: &str) -> String;

    /// `count(*)` spelling
    fn count_star(&self) -> &'static str;

    /// Generate LIMIT/OFFSET clause parts
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(limit) = limit {
            parts.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {}", offset));
        }
        parts
    }

    /// Generate ORDER BY term with optional NULL placement
    fn order_by_with_nulls(&self, col: &str, desc: bool, nulls_last: Option<bool>) -> String;
}
