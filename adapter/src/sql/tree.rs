//! Query tree
//!
//! A closed set of node types the visitor renders. ClickHouse-only clauses
//! (FINAL, SETTINGS, LIMIT BY, USING, WINDOW, GROUPING SETS) are added through
//! builder methods that validate their arguments, so a malformed tree is
//! rejected before it can reach the visitor.

use std::collections::HashSet;
use std::ops::Not;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::AdapterError;
use crate::types::Value;

fn identifier_pattern() -> &'static Regex {
    static RE_IDENT: OnceLock<Regex> = OnceLock::new();
    RE_IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("Invalid regex")
    })
}

/// Whether `name` is a plain (optionally table-qualified) identifier
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

// =============================================================================
// Relations
// =============================================================================

/// Named table, optionally database-qualified and aliased
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub database: Option<String>,
    pub alias: Option<String>,
    view: bool,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: None,
            alias: None,
            view: false,
        }
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Mark the table as a view whose columns hold aggregate states
    pub fn view(mut self) -> Self {
        self.view = true;
        self
    }

    pub fn is_view(&self) -> bool {
        self.view
    }

    /// Name columns are qualified with
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Column of this table
    pub fn column(&self, name: impl Into<String>) -> Expr {
        Expr::Column(ColumnRef {
            table: Some(self.qualifier().to_string()),
            name: name.into(),
        })
    }
}

/// Anything a query can read from
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table(TableRef),
    Subquery {
        query: Box<SelectStatement>,
        alias: Option<String>,
    },
    /// Table function such as `numbers(10)`
    Function {
        name: String,
        args: Vec<Expr>,
        alias: Option<String>,
    },
}

impl Relation {
    pub fn table(name: impl Into<String>) -> Self {
        Relation::Table(TableRef::new(name))
    }

    pub fn subquery(query: SelectStatement, alias: Option<&str>) -> Self {
        Relation::Subquery {
            query: Box::new(query),
            alias: alias.map(str::to_string),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Relation::Function {
            name: name.into(),
            args,
            alias: None,
        }
    }

    /// Flag the relation as a view; only named tables can be views
    pub fn mark_view(&mut self) -> Result<(), AdapterError> {
        match self {
            Relation::Table(table) => {
                table.view = true;
                Ok(())
            }
            Relation::Subquery { .. } => Err(AdapterError::unsupported(
                "a subquery cannot be marked as a view",
            )),
            Relation::Function { name, .. } => Err(AdapterError::unsupported(format!(
                "table function {} cannot be marked as a view",
                name
            ))),
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Relation::Table(table) if table.view)
    }

    /// Name columns are qualified with, if the relation has one
    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Relation::Table(table) => Some(table.qualifier()),
            Relation::Subquery { alias, .. } | Relation::Function { alias, .. } => alias.as_deref(),
        }
    }
}

impl From<TableRef> for Relation {
    fn from(table: TableRef) -> Self {
        Relation::Table(table)
    }
}

impl From<&str> for Relation {
    fn from(name: &str) -> Self {
        Relation::table(name)
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
        }
    }

    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => 4,
            BinaryOp::Concat => 5,
            BinaryOp::Plus | BinaryOp::Minus => 6,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 7,
        }
    }
}

/// Window reference of an `OVER` clause
#[derive(Debug, Clone, PartialEq)]
pub enum WindowRef {
    Named(String),
    Inline(WindowSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// `*` or `t.*`
    Star(Option<String>),
    Literal(Value),
    /// Verbatim SQL fragment
    Raw(String),
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Aggregate call; rendered with the `Merge` combinator over view columns
    Aggregate {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectStatement>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_sensitive: bool,
        negated: bool,
        escape: Option<char>,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Over {
        expr: Box<Expr>,
        window: WindowRef,
    },
    Alias {
        expr: Box<Expr>,
        alias: String,
    },
    Subquery(Box<SelectStatement>),
}

impl Expr {
    /// Column by name; `t.col` is split into qualifier and name
    pub fn col(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once('.') {
            Some((table, column)) if is_identifier(&name) => Expr::Column(ColumnRef {
                table: Some(table.to_string()),
                name: column.to_string(),
            }),
            _ => Expr::Column(ColumnRef { table: None, name }),
        }
    }

    pub fn star() -> Self {
        Expr::Star(None)
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn aggregate(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Aggregate {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn sum(expr: Expr) -> Self {
        Self::aggregate("sum", vec![expr])
    }

    pub fn avg(expr: Expr) -> Self {
        Self::aggregate("avg", vec![expr])
    }

    pub fn min(expr: Expr) -> Self {
        Self::aggregate("min", vec![expr])
    }

    pub fn max(expr: Expr) -> Self {
        Self::aggregate("max", vec![expr])
    }

    pub fn uniq(expr: Expr) -> Self {
        Self::aggregate("uniq", vec![expr])
    }

    pub fn count(expr: Expr) -> Self {
        Self::aggregate("count", vec![expr])
    }

    pub fn count_star() -> Self {
        Self::aggregate("count", vec![Expr::star()])
    }

    pub fn count_distinct(expr: Expr) -> Self {
        Expr::Aggregate {
            name: "count".to_string(),
            args: vec![expr],
            distinct: true,
        }
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, right.into())
    }

    pub fn not_equals(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::NotEq, right.into())
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, right.into())
    }

    pub fn lt_eq(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::LtEq, right.into())
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, right.into())
    }

    pub fn gt_eq(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::GtEq, right.into())
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    pub fn plus(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Plus, right.into())
    }

    pub fn minus(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Minus, right.into())
    }

    pub fn times(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Multiply, right.into())
    }

    pub fn divided_by(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Divide, right.into())
    }

    pub fn modulo(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Modulo, right.into())
    }

    pub fn concat(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Concat, right.into())
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn not_in_list(self, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: true,
        }
    }

    pub fn in_subquery(self, query: SelectStatement) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    /// Pattern match; `case_sensitive = false` renders `ILIKE`
    pub fn matches(self, pattern: impl Into<Expr>, case_sensitive: bool) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            case_sensitive,
            negated: false,
            escape: None,
        }
    }

    pub fn does_not_match(self, pattern: impl Into<Expr>, case_sensitive: bool) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            case_sensitive,
            negated: true,
            escape: None,
        }
    }

    /// Set the escape character of a pattern match; other nodes are unchanged
    pub fn escape(mut self, ch: char) -> Self {
        if let Expr::Like { escape, .. } = &mut self {
            *escape = Some(ch);
        }
        self
    }

    pub fn case(operand: Option<Expr>) -> Self {
        Expr::Case {
            operand: operand.map(Box::new),
            branches: Vec::new(),
            otherwise: None,
        }
    }

    pub fn when(mut self, condition: impl Into<Expr>, result: impl Into<Expr>) -> Self {
        if let Expr::Case { branches, .. } = &mut self {
            branches.push((condition.into(), result.into()));
        }
        self
    }

    pub fn otherwise(mut self, result: impl Into<Expr>) -> Self {
        if let Expr::Case { otherwise, .. } = &mut self {
            *otherwise = Some(Box::new(result.into()));
        }
        self
    }

    /// `expr OVER name`
    pub fn over(self, window: impl Into<String>) -> Self {
        Expr::Over {
            expr: Box::new(self),
            window: WindowRef::Named(window.into()),
        }
    }

    /// `expr OVER (spec)`
    pub fn over_spec(self, spec: WindowSpec) -> Self {
        Expr::Over {
            expr: Box::new(self),
            window: WindowRef::Inline(spec),
        }
    }

    pub fn alias(self, alias: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn asc(self) -> OrderBy {
        OrderBy {
            expr: self,
            desc: false,
            nulls_last: None,
        }
    }

    pub fn desc(self) -> OrderBy {
        OrderBy {
            expr: self,
            desc: true,
            nulls_last: None,
        }
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::lit(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::lit(value)
    }
}

impl From<u64> for Expr {
    fn from(value: u64) -> Self {
        Expr::lit(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::lit(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::lit(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
    pub nulls_last: Option<bool>,
}

impl OrderBy {
    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = Some(true);
        self
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_last = Some(false);
        self
    }
}

// =============================================================================
// Windows
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub frame: Option<WindowFrame>,
}

impl WindowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_by(mut self, expr: Expr) -> Self {
        self.partition_by.push(expr);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn rows(mut self, start: FrameBound, end: Option<FrameBound>) -> Self {
        self.frame = Some(WindowFrame {
            units: FrameUnits::Rows,
            start,
            end,
        });
        self
    }

    pub fn range(mut self, start: FrameBound, end: Option<FrameBound>) -> Self {
        self.frame = Some(WindowFrame {
            units: FrameUnits::Range,
            start,
            end,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowDef {
    pub name: String,
    pub spec: WindowSpec,
}

// =============================================================================
// Clauses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<String>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinClause {
    Table {
        kind: JoinKind,
        relation: Relation,
        constraint: JoinConstraint,
    },
    /// `[LEFT] ARRAY JOIN expr [AS alias], ...`
    Array { left: bool, items: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
    Exprs(Vec<Expr>),
    /// Each set is a list of raw tokens; an empty set renders `()`
    GroupingSets(Vec<Vec<String>>),
    Rollup(Vec<Expr>),
    Cube(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitBy {
    pub limit: u64,
    pub offset: Option<u64>,
}

/// Setting name; sanitized keys lose every non-word character at render
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Sanitized(String),
    Verbatim(String),
}

impl SettingKey {
    pub fn verbatim(key: impl Into<String>) -> Self {
        SettingKey::Verbatim(key.into())
    }

    pub fn render(&self) -> String {
        match self {
            SettingKey::Sanitized(key) => key
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect(),
            SettingKey::Verbatim(key) => key.clone(),
        }
    }
}

impl From<&str> for SettingKey {
    fn from(key: &str) -> Self {
        SettingKey::Sanitized(key.to_string())
    }
}

impl From<String> for SettingKey {
    fn from(key: String) -> Self {
        SettingKey::Sanitized(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Renders as the bare `DEFAULT` token
    Default,
    Value(Value),
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("default") {
            SettingValue::Default
        } else {
            SettingValue::Value(Value::from(value))
        }
    }
}

impl From<Value> for SettingValue {
    fn from(value: Value) -> Self {
        SettingValue::Value(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Value(Value::Int(value))
    }
}

impl From<u64> for SettingValue {
    fn from(value: u64) -> Self {
        SettingValue::Value(Value::UInt(value))
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Value(Value::Bool(value))
    }
}

/// Per-query SETTINGS, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings(IndexMap<SettingKey, SettingValue>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<SettingKey>, value: impl Into<SettingValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SettingKey, &SettingValue)> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<SettingKey>,
    V: Into<SettingValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (key, value) in iter {
            settings.set(key, value);
        }
        settings
    }
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub relation: Relation,
    pub final_: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStatement {
    pub(crate) distinct: bool,
    pub(crate) projections: Vec<Expr>,
    pub(crate) source: Option<Source>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) predicates: Vec<Expr>,
    pub(crate) group: Option<GroupBy>,
    pub(crate) having: Vec<Expr>,
    pub(crate) windows: Vec<WindowDef>,
    pub(crate) orders: Vec<OrderBy>,
    pub(crate) limit_by: Option<(LimitBy, Vec<String>)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) settings: Settings,
    pub(crate) lock: Option<String>,
}

impl SelectStatement {
    /// `SELECT` without a source
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_relation(relation: impl Into<Relation>) -> Self {
        Self {
            source: Some(Source {
                relation: relation.into(),
                final_: false,
            }),
            ..Self::default()
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn column(mut self, expr: Expr) -> Self {
        self.projections.push(expr);
        self
    }

    pub fn columns(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.projections.extend(exprs);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// `FROM t FINAL`; applies to the primary source only
    pub fn final_(mut self) -> Result<Self, AdapterError> {
        match self.source.as_mut() {
            Some(source) => {
                source.final_ = true;
                Ok(self)
            }
            None => Err(AdapterError::invalid("FINAL requires a FROM source")),
        }
    }

    /// Flag the primary source as a view
    pub fn from_view(mut self) -> Result<Self, AdapterError> {
        match self.source.as_mut() {
            Some(source) => {
                source.relation.mark_view()?;
                Ok(self)
            }
            None => Err(AdapterError::invalid("no FROM source to mark as a view")),
        }
    }

    pub fn join(mut self, kind: JoinKind, relation: impl Into<Relation>, on: Expr) -> Self {
        let constraint = if kind == JoinKind::Cross {
            JoinConstraint::None
        } else {
            JoinConstraint::On(on)
        };
        self.joins.push(JoinClause::Table {
            kind,
            relation: relation.into(),
            constraint,
        });
        self
    }

    pub fn cross_join(mut self, relation: impl Into<Relation>) -> Self {
        self.joins.push(JoinClause::Table {
            kind: JoinKind::Cross,
            relation: relation.into(),
            constraint: JoinConstraint::None,
        });
        self
    }

    /// `JOIN relation USING (columns)`
    pub fn using(
        mut self,
        kind: JoinKind,
        relation: impl Into<Relation>,
        columns: &[&str],
    ) -> Result<Self, AdapterError> {
        if kind == JoinKind::Cross {
            return Err(AdapterError::invalid("CROSS JOIN takes no USING clause"));
        }
        if columns.is_empty() {
            return Err(AdapterError::invalid("USING requires at least one column"));
        }
        if let Some(bad) = columns.iter().find(|c| !is_identifier(c)) {
            return Err(AdapterError::invalid(format!(
                "USING column {:?} is not an identifier",
                bad
            )));
        }
        self.joins.push(JoinClause::Table {
            kind,
            relation: relation.into(),
            constraint: JoinConstraint::Using(columns.iter().map(|c| c.to_string()).collect()),
        });
        Ok(self)
    }

    pub fn array_join(mut self, items: Vec<Expr>) -> Result<Self, AdapterError> {
        if items.is_empty() {
            return Err(AdapterError::invalid("ARRAY JOIN requires at least one expression"));
        }
        self.joins.push(JoinClause::Array { left: false, items });
        Ok(self)
    }

    pub fn left_array_join(mut self, items: Vec<Expr>) -> Result<Self, AdapterError> {
        if items.is_empty() {
            return Err(AdapterError::invalid("ARRAY JOIN requires at least one expression"));
        }
        self.joins.push(JoinClause::Array { left: true, items });
        Ok(self)
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group = Some(GroupBy::Exprs(exprs));
        self
    }

    pub fn rollup(mut self, exprs: Vec<Expr>) -> Self {
        self.group = Some(GroupBy::Rollup(exprs));
        self
    }

    pub fn cube(mut self, exprs: Vec<Expr>) -> Self {
        self.group = Some(GroupBy::Cube(exprs));
        self
    }

    /// `GROUP BY GROUPING SETS ((a, b), (a), ())`
    pub fn grouping_sets<I, S, T>(mut self, sets: I) -> Result<Self, AdapterError>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut rendered = Vec::new();
        for set in sets {
            let mut tokens = Vec::new();
            for token in set {
                let token = token.into();
                if token.trim().is_empty() {
                    return Err(AdapterError::invalid(
                        "grouping set elements must be non-empty expressions",
                    ));
                }
                tokens.push(token.trim().to_string());
            }
            rendered.push(tokens);
        }
        if rendered.is_empty() {
            return Err(AdapterError::invalid("GROUPING SETS requires at least one set"));
        }
        self.group = Some(GroupBy::GroupingSets(rendered));
        Ok(self)
    }

    pub fn having(mut self, predicate: Expr) -> Self {
        self.having.push(predicate);
        self
    }

    /// Named window for `WINDOW name AS (...)`
    pub fn window(mut self, name: &str, spec: WindowSpec) -> Result<Self, AdapterError> {
        if !is_identifier(name) || name.contains('.') {
            return Err(AdapterError::invalid(format!(
                "window name {:?} is not an identifier",
                name
            )));
        }
        if self.windows.iter().any(|w| w.name == name) {
            return Err(AdapterError::invalid(format!("window {} defined twice", name)));
        }
        self.windows.push(WindowDef {
            name: name.to_string(),
            spec,
        });
        Ok(self)
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.orders.push(order);
        self
    }

    /// `LIMIT n BY column`
    pub fn limit_by(self, n: i64, column: &str) -> Result<Self, AdapterError> {
        self.limit_by_offset(n, None, &[column])
    }

    /// `LIMIT [offset,] n BY columns`
    pub fn limit_by_offset(
        mut self,
        n: i64,
        offset: Option<i64>,
        columns: &[&str],
    ) -> Result<Self, AdapterError> {
        let limit = u64::try_from(n).map_err(|_| {
            AdapterError::invalid(format!("LIMIT BY count must be non-negative, got {}", n))
        })?;
        let offset = offset
            .map(|o| {
                u64::try_from(o).map_err(|_| {
                    AdapterError::invalid(format!("LIMIT BY offset must be non-negative, got {}", o))
                })
            })
            .transpose()?;
        if columns.is_empty() {
            return Err(AdapterError::invalid("LIMIT BY requires a column"));
        }
        if let Some(bad) = columns.iter().find(|c| !is_identifier(c)) {
            return Err(AdapterError::invalid(format!(
                "LIMIT BY column {:?} is not an identifier",
                bad
            )));
        }
        self.limit_by = Some((
            LimitBy { limit, offset },
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        Ok(self)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Add query-level SETTINGS, later keys overriding earlier ones
    pub fn with_settings<K, V>(mut self, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<SettingKey>,
        V: Into<SettingValue>,
    {
        for (key, value) in settings {
            self.settings.set(key, value);
        }
        self
    }

    /// Row lock such as `FOR UPDATE`; ClickHouse has none, so rendering fails
    pub fn lock(mut self, clause: impl Into<String>) -> Self {
        self.lock = Some(clause.into());
        self
    }

    /// Qualifiers of every view relation in scope, and whether the source is one
    pub(crate) fn view_scope(&self) -> (HashSet<String>, bool) {
        let mut views = HashSet::new();
        let mut source_is_view = false;
        if let Some(source) = &self.source {
            if source.relation.is_view() {
                source_is_view = true;
                if let Some(q) = source.relation.qualifier() {
                    views.insert(q.to_string());
                }
            }
        }
        for join in &self.joins {
            if let JoinClause::Table { relation, .. } = join {
                if relation.is_view() {
                    if let Some(q) = relation.qualifier() {
                        views.insert(q.to_string());
                    }
                }
            }
        }
        (views, source_is_view)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Value>>),
    Select(Box<SelectStatement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub(crate) table: TableRef,
    pub(crate) columns: Vec<String>,
    pub(crate) source: InsertSource,
    pub(crate) settings: Settings,
}

impl InsertStatement {
    pub fn values(
        table: TableRef,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, AdapterError> {
        if rows.is_empty() {
            return Err(AdapterError::invalid("INSERT requires at least one row"));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(AdapterError::invalid(format!(
                "INSERT row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            table,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source: InsertSource::Values(rows),
            settings: Settings::new(),
        })
    }

    pub fn select(table: TableRef, columns: &[&str], query: SelectStatement) -> Self {
        Self {
            table,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source: InsertSource::Select(Box::new(query)),
            settings: Settings::new(),
        }
    }

    pub fn with_settings<K, V>(mut self, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<SettingKey>,
        V: Into<SettingValue>,
    {
        for (key, value) in settings {
            self.settings.set(key, value);
        }
        self
    }
}

/// Row-level UPDATE as produced by a generic query builder
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub(crate) relation: Relation,
    pub(crate) assignments: Vec<(String, Expr)>,
    pub(crate) predicates: Vec<Expr>,
    pub(crate) orders: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) settings: Settings,
}

impl UpdateStatement {
    pub fn new(relation: impl Into<Relation>) -> Self {
        Self {
            relation: relation.into(),
            assignments: Vec::new(),
            predicates: Vec::new(),
            orders: Vec::new(),
            limit: None,
            joins: Vec::new(),
            settings: Settings::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<Expr>) -> Result<Self, AdapterError> {
        if !is_identifier(column) {
            return Err(AdapterError::invalid(format!(
                "UPDATE column {:?} is not an identifier",
                column
            )));
        }
        self.assignments.push((column.to_string(), value.into()));
        Ok(self)
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.orders.push(order);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn join(mut self, kind: JoinKind, relation: impl Into<Relation>, on: Expr) -> Self {
        self.joins.push(JoinClause::Table {
            kind,
            relation: relation.into(),
            constraint: JoinConstraint::On(on),
        });
        self
    }

    pub fn with_settings<K, V>(mut self, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<SettingKey>,
        V: Into<SettingValue>,
    {
        for (key, value) in settings {
            self.settings.set(key, value);
        }
        self
    }
}

/// Row-level DELETE as produced by a generic query builder
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub(crate) relation: Relation,
    pub(crate) predicates: Vec<Expr>,
    pub(crate) orders: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) settings: Settings,
}

impl DeleteStatement {
    pub fn new(relation: impl Into<Relation>) -> Self {
        Self {
            relation: relation.into(),
            predicates: Vec::new(),
            orders: Vec::new(),
            limit: None,
            joins: Vec::new(),
            settings: Settings::new(),
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.orders.push(order);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn join(mut self, kind: JoinKind, relation: impl Into<Relation>, on: Expr) -> Self {
        self.joins.push(JoinClause::Table {
            kind,
            relation: relation.into(),
            constraint: JoinConstraint::On(on),
        });
        self
    }

    pub fn with_settings<K, V>(mut self, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<SettingKey>,
        V: Into<SettingValue>,
    {
        for (key, value) in settings {
            self.settings.set(key, value);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SelectStatement>),
    Insert(Box<InsertStatement>),
    Update(Box<UpdateStatement>),
    Delete(Box<DeleteStatement>),
}

impl Statement {
    /// Whether this is a mutation (rendered without column qualifiers)
    pub fn is_mutation(&self) -> bool {
        matches!(self, Statement::Update(_) | Statement::Delete(_))
    }
}

impl From<SelectStatement> for Statement {
    fn from(stmt: SelectStatement) -> Self {
        Statement::Select(Box::new(stmt))
    }
}

impl From<InsertStatement> for Statement {
    fn from(stmt: InsertStatement) -> Self {
        Statement::Insert(Box::new(stmt))
    }
}

impl From<UpdateStatement> for Statement {
    fn from(stmt: UpdateStatement) -> Self {
        Statement::Update(Box::new(stmt))
    }
}

impl From<DeleteStatement> for Statement {
    fn from(stmt: DeleteStatement) -> Self {
        Statement::Delete(Box::new(stmt))
    }
}
