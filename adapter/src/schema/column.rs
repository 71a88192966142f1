//! Column definition rendering
//!
//! A column is rendered by running its base type through a fixed sequence of
//! decoration steps. Each step only looks at the type text built so far, so
//! running the pipeline twice yields the same SQL as running it once.

use std::sync::OnceLock;

use regex::Regex;

use super::definition::{ColumnDefault, ColumnDefinition, ColumnOptions, MapMode};
use crate::types::{TypeRegistry, quote_identifier, quote_string};

/// Type wrappers in nesting order, innermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Wrapper {
    Nullable,
    LowCardinality,
    Array,
    Map,
}

impl Wrapper {
    fn open(self) -> &'static str {
        match self {
            Wrapper::Nullable => "Nullable(",
            Wrapper::LowCardinality => "LowCardinality(",
            Wrapper::Array => "Array(",
            Wrapper::Map => "Map(String, ",
        }
    }
}

fn sized_string_pattern() -> &'static Regex {
    static RE_SIZED_STRING: OnceLock<Regex> = OnceLock::new();
    RE_SIZED_STRING.get_or_init(|| Regex::new(r"^String\(\d+\)$").expect("Invalid regex"))
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Peel the outer wrapper chain off a type string, outermost first
fn split_wrappers(ty: &str) -> (Vec<Wrapper>, &str) {
    let mut wrappers = Vec::new();
    let mut core = ty.trim();
    'peel: loop {
        for wrapper in [
            Wrapper::Map,
            Wrapper::Array,
            Wrapper::LowCardinality,
            Wrapper::Nullable,
        ] {
            let inner = core
                .strip_prefix(wrapper.open())
                .and_then(|rest| rest.strip_suffix(')'));
            if let Some(inner) = inner.filter(|inner| balanced(inner)) {
                wrappers.push(wrapper);
                core = inner.trim();
                continue 'peel;
            }
        }
        return (wrappers, core);
    }
}

fn join_wrappers(wrappers: &[Wrapper], core: &str) -> String {
    let mut ty = core.to_string();
    for wrapper in wrappers.iter().rev() {
        ty = format!("{}{})", wrapper.open(), ty);
    }
    ty
}

/// Add `wrapper` to the chain unless it is already present
fn wrap(ty: &str, wrapper: Wrapper) -> String {
    let (mut wrappers, core) = split_wrappers(ty);
    if !wrappers.contains(&wrapper) {
        wrappers.push(wrapper);
        wrappers.sort_by(|a, b| b.cmp(a));
    }
    join_wrappers(&wrappers, core)
}

/// Replace the innermost type token, keeping the wrapper chain
fn map_core(ty: &str, f: impl FnOnce(&str) -> String) -> String {
    let (wrappers, core) = split_wrappers(ty);
    join_wrappers(&wrappers, &f(core))
}

/// Column fragment under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSql {
    pub name: String,
    pub ty: String,
    pub default: Option<String>,
    pub codec: Option<String>,
    pub ttl: Option<String>,
    pub comment: Option<String>,
    pub after: Option<String>,
}

type Step = fn(ColumnSql, &ColumnOptions) -> ColumnSql;

const TYPE_STEPS: &[Step] = &[
    value_override,
    fixed_string,
    nullable,
    low_cardinality,
    array,
    map,
    codec,
    strip_string_size,
];

fn value_override(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if let Some(value) = &opts.value {
        sql.ty = map_core(&sql.ty, |core| {
            if core.contains('(') {
                core.to_string()
            } else {
                format!("{}({})", core, value)
            }
        });
    }
    sql
}

fn fixed_string(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if let Some(width) = opts.fixed_string {
        sql.ty = map_core(&sql.ty, |_| format!("FixedString({})", width));
    }
    sql
}

fn nullable(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if opts.null != Some(false) {
        sql.ty = wrap(&sql.ty, Wrapper::Nullable);
    }
    sql
}

fn low_cardinality(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if opts.low_cardinality {
        sql.ty = wrap(&sql.ty, Wrapper::LowCardinality);
    }
    sql
}

fn array(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if opts.array {
        sql.ty = wrap(&sql.ty, Wrapper::Array);
    }
    sql
}

fn map(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    match opts.map {
        Some(MapMode::Plain) => sql.ty = wrap(&sql.ty, Wrapper::Map),
        Some(MapMode::Array) => sql.ty = wrap(&wrap(&sql.ty, Wrapper::Array), Wrapper::Map),
        None => {}
    }
    sql
}

fn codec(mut sql: ColumnSql, opts: &ColumnOptions) -> ColumnSql {
    if let Some(codec) = &opts.codec {
        sql.codec = Some(codec.clone());
    }
    sql
}

fn strip_string_size(mut sql: ColumnSql, _opts: &ColumnOptions) -> ColumnSql {
    sql.ty = map_core(&sql.ty, |core| {
        if sized_string_pattern().is_match(core) {
            "String".to_string()
        } else {
            core.to_string()
        }
    });
    sql
}

impl ColumnSql {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            codec: None,
            ttl: None,
            comment: None,
            after: None,
        }
    }

    /// Fragment for a column definition with every decoration applied
    pub fn from_definition(column: &ColumnDefinition, add_column: bool) -> Self {
        let base = column.column_type.base_sql(&column.options);
        ColumnSql::new(&column.name, base).decorate(column, add_column)
    }

    /// Apply the decoration pipeline
    pub fn decorate(self, column: &ColumnDefinition, add_column: bool) -> Self {
        let opts = &column.options;
        let mut sql = TYPE_STEPS.iter().fold(self, |sql, step| step(sql, opts));
        if add_column {
            sql.after = opts.after.clone();
        }
        if let Some(default) = &column.default {
            sql.default = Some(default_sql(&sql.ty, default));
        }
        sql.ttl = opts.ttl.clone();
        sql.comment = opts.comment.clone();
        sql
    }

    /// Column declaration in ClickHouse grammar order
    pub fn render(&self) -> String {
        let mut out = format!("{} {}", quote_identifier(&self.name), self.ty);
        if let Some(default) = &self.default {
            out.push_str(&format!(" DEFAULT {}", default));
        }
        if let Some(comment) = &self.comment {
            out.push_str(&format!(" COMMENT {}", quote_string(comment)));
        }
        if let Some(codec) = &self.codec {
            out.push_str(&format!(" CODEC({})", codec));
        }
        if let Some(ttl) = &self.ttl {
            out.push_str(&format!(" TTL {}", ttl));
        }
        if let Some(after) = &self.after {
            out.push_str(&format!(" AFTER {}", quote_identifier(after)));
        }
        out
    }
}

/// Default clause value; literals are encoded for the decorated column type
pub fn default_sql(ty: &str, default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Expression(expr) => expr.clone(),
        ColumnDefault::Value(value) => TypeRegistry::global()
            .encode_literal(ty, value)
            .unwrap_or_else(|_| value.to_sql_literal()),
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use num_bigint::BigInt;

    use super::*;
    use crate::schema::definition::ColumnType;

    fn render(column: &ColumnDefinition) -> String {
        ColumnSql::from_definition(column, false).render()
    }

    #[test]
    fn test_nullable_by_default() {
        let column = ColumnDefinition::new("name", ColumnType::String);
        assert_eq!(render(&column), "`name` Nullable(String)");
        let column = ColumnDefinition::new("name", ColumnType::String).null(false);
        assert_eq!(render(&column), "`name` String");
    }

    #[test]
    fn test_wrapper_order() {
        let column = ColumnDefinition::new("tags", ColumnType::String)
            .low_cardinality()
            .array()
            .unwrap();
        assert_eq!(
            render(&column),
            "`tags` Array(LowCardinality(Nullable(String)))"
        );

        let column = ColumnDefinition::new("attrs", ColumnType::String)
            .null(false)
            .map(MapMode::Array)
            .unwrap();
        assert_eq!(render(&column), "`attrs` Map(String, Array(String))");

        let column = ColumnDefinition::new("attrs", ColumnType::Integer)
            .null(false)
            .low_cardinality()
            .map(MapMode::Plain)
            .unwrap();
        assert_eq!(render(&column), "`attrs` Map(String, LowCardinality(UInt32))");
    }

    #[test]
    fn test_decoration_is_idempotent() {
        let column = ColumnDefinition::new("tags", ColumnType::String)
            .limit(255)
            .low_cardinality()
            .map(MapMode::Array)
            .unwrap()
            .codec("ZSTD(1)")
            .default_expression("map()");
        let once = ColumnSql::from_definition(&column, false);
        let twice = once.clone().decorate(&column, false);
        assert_eq!(once, twice);
        assert_eq!(
            once.render(),
            "`tags` Map(String, Array(LowCardinality(Nullable(String)))) DEFAULT map() CODEC(ZSTD(1))"
        );
    }

    #[test]
    fn test_user_supplied_wrappers_are_not_doubled() {
        let column = ColumnDefinition::new("v", ColumnType::Custom("Nullable(UInt8)".into()));
        assert_eq!(render(&column), "`v` Nullable(UInt8)");
        let column = ColumnDefinition::new("v", ColumnType::Custom("Array(String)".into()))
            .null(false)
            .array()
            .unwrap();
        assert_eq!(render(&column), "`v` Array(String)");
    }

    #[test]
    fn test_string_size_stripped() {
        let column = ColumnDefinition::new("title", ColumnType::String).limit(255);
        assert_eq!(render(&column), "`title` Nullable(String)");
    }

    #[test]
    fn test_fixed_string_and_value_override() {
        let column = ColumnDefinition::new("code", ColumnType::String)
            .null(false)
            .fixed_string(3);
        assert_eq!(render(&column), "`code` FixedString(3)");

        let column = ColumnDefinition::new("state", ColumnType::Custom("Enum8".into()))
            .null(false)
            .value("'on' = 1, 'off' = 2");
        assert_eq!(render(&column), "`state` Enum8('on' = 1, 'off' = 2)");
    }

    #[test]
    fn test_defaults_encoded_for_type() {
        let column = ColumnDefinition::new("price", ColumnType::Decimal)
            .precision(10, Some(2))
            .null(false)
            .default_value(BigDecimal::new(BigInt::from(5000), 2));
        assert_eq!(render(&column), "`price` Decimal(10, 2) DEFAULT 50.");

        let column = ColumnDefinition::new("name", ColumnType::String)
            .null(false)
            .default_value("it's");
        assert_eq!(render(&column), "`name` String DEFAULT 'it\\'s'");

        let column = ColumnDefinition::new("ratio", ColumnType::Float)
            .null(false)
            .default_value(1.0);
        assert_eq!(render(&column), "`ratio` Float32 DEFAULT 1.0");
    }

    #[test]
    fn test_after_only_for_add_column() {
        let column = ColumnDefinition::new("b", ColumnType::Integer)
            .null(false)
            .after("a")
            .default_value(1i64)
            .comment("second");
        assert_eq!(
            ColumnSql::from_definition(&column, true).render(),
            "`b` UInt32 DEFAULT 1 COMMENT 'second' AFTER `a`"
        );
        assert_eq!(render(&column), "`b` UInt32 DEFAULT 1 COMMENT 'second'");
    }

    #[test]
    fn test_ttl() {
        let column = ColumnDefinition::new("payload", ColumnType::String)
            .null(false)
            .ttl("created_at + INTERVAL 1 DAY");
        assert_eq!(
            render(&column),
            "`payload` String TTL created_at + INTERVAL 1 DAY"
        );
    }
}
