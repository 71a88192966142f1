//! ClickHouse DDL generation
//!
//! Renders table, view, index, dictionary and database statements from typed
//! definitions. Supports both single-node and clustered deployments:
//! - Single-node: plain engines, no `ON CLUSTER`
//! - Clustered: `ON CLUSTER` on every statement, `Replicated*MergeTree`
//!   engines and `Distributed` companion tables

mod column;
mod creation;
mod definition;
mod service_tables;
mod statements;

pub use column::ColumnSql;
pub use creation::{DdlOptions, Introspect, ReplicaOptions, SchemaCreation};
pub use definition::{
    ColumnDefault, ColumnDefinition, ColumnOptions, ColumnType, DictionaryAttribute,
    DictionaryDefinition, DictionaryLifetime, DistributedOptions, IndexDefinition, IndexPosition,
    MapMode, TableDefinition, TableKind,
};
pub use service_tables::service_table_name;
pub use statements::{DropKind, DropOptions};
