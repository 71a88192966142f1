//! ClickHouse SQL dialect
//!
//! Query trees are built with validated builders (`tree`) and rendered by a
//! stateless visitor; leaf-level syntax lives in the dialect.

mod clickhouse_dialect;
mod dialect;
mod tree;
mod visitor;

pub use clickhouse_dialect::ClickhouseDialect;
pub use dialect::SqlDialect;
pub use tree::{
    BinaryOp, ColumnRef, DeleteStatement, Expr, FrameBound, FrameUnits, GroupBy, InsertSource,
    InsertStatement, JoinClause, JoinConstraint, JoinKind, LimitBy, OrderBy, Relation,
    SelectStatement, SettingKey, SettingValue, Settings, Source, Statement, TableRef,
    UpdateStatement, WindowDef, WindowFrame, WindowRef, WindowSpec, is_identifier,
};
pub use visitor::ClickhouseVisitor;
