//! Migration bookkeeping tables
//!
//! With distributed service tables enabled, each table gets a `Distributed`
//! companion named `<table><suffix>` that reads and writes go through.

use super::creation::SchemaCreation;
use super::definition::{ColumnDefinition, ColumnType, TableDefinition};
use crate::constants::{INTERNAL_METADATA_TABLE, SCHEMA_MIGRATIONS_TABLE};
use crate::error::AdapterError;

/// Table that reads and writes should target
pub fn service_table_name(table: &str, distributed_suffix: Option<&str>) -> String {
    match distributed_suffix {
        Some(suffix) => format!("{}{}", table, suffix),
        None => table.to_string(),
    }
}

fn with_companion(
    def: TableDefinition,
    distributed_suffix: Option<&str>,
    sharding_key: &str,
) -> TableDefinition {
    match distributed_suffix {
        Some(suffix) => {
            let companion = format!("{}{}", def.name, suffix);
            def.distributed(companion, Some(sharding_key))
        }
        None => def,
    }
}

impl SchemaCreation<'_> {
    /// `schema_migrations (version, active, ver)`
    pub fn schema_migrations_table(
        &self,
        distributed_suffix: Option<&str>,
    ) -> Result<Vec<String>, AdapterError> {
        let def = TableDefinition::new(SCHEMA_MIGRATIONS_TABLE)
            .if_not_exists()
            .column(ColumnDefinition::new("version", ColumnType::String).null(false))
            .column(
                ColumnDefinition::new("active", ColumnType::Integer)
                    .null(false)
                    .limit(1)
                    .signed()
                    .default_value(1i64),
            )
            .column(
                ColumnDefinition::new("ver", ColumnType::DateTime)
                    .null(false)
                    .default_expression("now()"),
            )
            .engine("ReplacingMergeTree(ver)")
            .order_by("version");
        self.create_table(&with_companion(
            def,
            distributed_suffix,
            "cityHash64(version)",
        ))
    }

    /// `ar_internal_metadata (key, value, created_at, updated_at)`
    pub fn internal_metadata_table(
        &self,
        distributed_suffix: Option<&str>,
    ) -> Result<Vec<String>, AdapterError> {
        let def = TableDefinition::new(INTERNAL_METADATA_TABLE)
            .if_not_exists()
            .column(ColumnDefinition::new("key", ColumnType::String).null(false))
            .column(ColumnDefinition::new("value", ColumnType::String).null(false))
            .column(ColumnDefinition::new("created_at", ColumnType::DateTime).null(false))
            .column(ColumnDefinition::new("updated_at", ColumnType::DateTime).null(false))
            .engine("ReplacingMergeTree(created_at)")
            .partition_by("key")
            .order_by("key");
        self.create_table(&with_companion(def, distributed_suffix, "cityHash64(key)"))
    }
}
