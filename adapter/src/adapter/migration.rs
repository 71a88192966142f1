//! Migration bookkeeping on top of the service tables
//!
//! Rows are never updated in place: `ReplacingMergeTree` keeps the newest
//! row per key, so deletion writes `active = 0` and reads use `FINAL`.

use chrono::{SubsecRound, Utc};

use super::{ClickhouseAdapter, Transport};
use crate::constants::{INTERNAL_METADATA_TABLE, SCHEMA_MIGRATIONS_TABLE};
use crate::error::AdapterError;
use crate::schema::service_table_name;
use crate::sql::{Expr, InsertStatement, SelectStatement, Statement, TableRef};
use crate::types::Value;

pub struct MigrationContext<'a, T: Transport> {
    adapter: &'a ClickhouseAdapter<T>,
}

impl<'a, T: Transport> MigrationContext<'a, T> {
    pub(super) fn new(adapter: &'a ClickhouseAdapter<T>) -> Self {
        Self { adapter }
    }

    fn table(&self, base: &str) -> TableRef {
        TableRef::new(service_table_name(
            base,
            self.adapter.config().service_table_suffix(),
        ))
    }

    /// Create both service tables (and their companions) if missing
    pub fn ensure_tables(&self) -> Result<(), AdapterError> {
        let schema = self.adapter.schema();
        let suffix = self.adapter.config().service_table_suffix();
        let mut statements = schema.schema_migrations_table(suffix)?;
        statements.extend(schema.internal_metadata_table(suffix)?);
        for sql in &statements {
            self.adapter.execute_ddl(sql)?;
        }
        tracing::debug!(
            distributed = suffix.is_some(),
            statements = statements.len(),
            "Migration tables ensured"
        );
        Ok(())
    }

    /// Applied migration versions, ascending
    pub fn versions(&self) -> Result<Vec<String>, AdapterError> {
        let select = SelectStatement::from_relation(self.table(SCHEMA_MIGRATIONS_TABLE))
            .column(Expr::col("version"))
            .final_()?
            .filter(Expr::col("active").equals(1i64))
            .order(Expr::col("version").asc());
        self.adapter
            .select_strings(&self.adapter.visitor().render_select(&select)?)
    }

    pub fn insert_version(&self, version: &str) -> Result<(), AdapterError> {
        self.write_version(version, true)
    }

    /// Mark a version as rolled back
    pub fn delete_version(&self, version: &str) -> Result<(), AdapterError> {
        self.write_version(version, false)
    }

    fn write_version(&self, version: &str, active: bool) -> Result<(), AdapterError> {
        let insert = InsertStatement::values(
            self.table(SCHEMA_MIGRATIONS_TABLE),
            &["version", "active"],
            vec![vec![
                Value::String(version.to_string()),
                Value::Int(i64::from(active)),
            ]],
        )?;
        self.adapter.execute_statement(&Statement::from(insert))?;
        tracing::debug!(version = %version, active, "Recorded migration version");
        Ok(())
    }

    /// Internal metadata value for `key`
    pub fn get(&self, key: &str) -> Result<Option<String>, AdapterError> {
        let select = SelectStatement::from_relation(self.table(INTERNAL_METADATA_TABLE))
            .column(Expr::col("value"))
            .final_()?
            .filter(Expr::col("key").equals(key))
            .limit(1);
        let values = self
            .adapter
            .select_strings(&self.adapter.visitor().render_select(&select)?)?;
        Ok(values.into_iter().next())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), AdapterError> {
        let now = Value::DateTime(Utc::now().trunc_subsecs(0));
        let insert = InsertStatement::values(
            self.table(INTERNAL_METADATA_TABLE),
            &["key", "value", "created_at", "updated_at"],
            vec![vec![
                Value::String(key.to_string()),
                Value::String(value.to_string()),
                now.clone(),
                now,
            ]],
        )?;
        self.adapter.execute_statement(&Statement::from(insert))?;
        tracing::debug!(key = %key, "Stored internal metadata");
        Ok(())
    }
}
