//! Catalog queries against `system.*` tables

use serde_json::Value as JsonValue;

use super::{ClickhouseAdapter, QueryOptions, Transport};
use crate::error::AdapterError;
use crate::response::ColumnMeta;
use crate::schema::Introspect;
use crate::sql::{Expr, SelectStatement, TableRef};
use crate::types::quote_identifier;

/// Data-skipping index as reported by `system.data_skipping_indices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub expression: String,
    pub index_type: String,
    pub granularity: u64,
}

fn system_table(name: &str) -> SelectStatement {
    SelectStatement::from_relation(TableRef::new(name).in_database("system"))
}

fn in_current_database() -> Expr {
    Expr::col("database").equals(Expr::func("currentDatabase", vec![]))
}

fn cell_string(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_u64(value: Option<&JsonValue>) -> u64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(JsonValue::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

impl<T: Transport> ClickhouseAdapter<T> {
    /// Tables (not views) in the current database
    pub fn tables(&self) -> Result<Vec<String>, AdapterError> {
        let select = system_table("tables")
            .column(Expr::col("name"))
            .filter(in_current_database())
            .filter(Expr::col("engine").not_in_list(vec![
                Expr::from("View"),
                Expr::from("MaterializedView"),
            ]))
            .order(Expr::col("name").asc());
        self.select_strings(&self.visitor().render_select(&select)?)
    }

    /// Views and materialized views in the current database
    pub fn views(&self) -> Result<Vec<String>, AdapterError> {
        let select = system_table("tables")
            .column(Expr::col("name"))
            .filter(in_current_database())
            .filter(Expr::col("engine").in_list(vec![
                Expr::from("View"),
                Expr::from("MaterializedView"),
            ]))
            .order(Expr::col("name").asc());
        self.select_strings(&self.visitor().render_select(&select)?)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, AdapterError> {
        let select = system_table("tables")
            .column(Expr::count_star())
            .filter(in_current_database())
            .filter(Expr::col("name").equals(name));
        let count = self.select_value(&self.visitor().render_select(&select)?)?;
        Ok(cell_u64(count.as_ref()) > 0)
    }

    /// Column names and types via `DESCRIBE TABLE`
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>, AdapterError> {
        let result = self.query(&format!("DESCRIBE TABLE {}", quote_identifier(table)))?;
        Ok(result
            .rows
            .iter()
            .map(|row| ColumnMeta::new(cell_string(row.first()), cell_string(row.get(1))))
            .collect())
    }

    /// Data-skipping indexes of `table`
    pub fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>, AdapterError> {
        let select = system_table("data_skipping_indices")
            .columns([
                Expr::col("name"),
                Expr::col("expr"),
                Expr::col("type_full"),
                Expr::col("granularity"),
            ])
            .filter(in_current_database())
            .filter(Expr::col("table").equals(table));
        let result = self.query(&self.visitor().render_select(&select)?)?;
        Ok(result
            .rows
            .iter()
            .map(|row| IndexInfo {
                name: cell_string(row.first()),
                expression: cell_string(row.get(1)),
                index_type: cell_string(row.get(2)),
                granularity: cell_u64(row.get(3)),
            })
            .collect())
    }

    /// `SHOW CREATE TABLE`, as returned by the server
    pub fn show_create_table(&self, table: &str) -> Result<String, AdapterError> {
        let sql = format!("SHOW CREATE TABLE {}", quote_identifier(table));
        match self.select_value(&sql)? {
            Some(value) => Ok(cell_string(Some(&value))),
            None => Err(AdapterError::invalid(format!("table {} not found", table))),
        }
    }

    /// User-defined SQL functions
    pub fn functions(&self) -> Result<Vec<String>, AdapterError> {
        let select = system_table("functions")
            .column(Expr::col("name"))
            .filter(Expr::col("origin").equals("SQLUserDefined"))
            .order(Expr::col("name").asc());
        self.select_strings(&self.visitor().render_select(&select)?)
    }

    pub fn current_database(&self) -> Result<String, AdapterError> {
        let value = self.select_value("SELECT currentDatabase()")?;
        Ok(cell_string(value.as_ref()))
    }

    pub fn database_exists(&self, name: &str) -> Result<bool, AdapterError> {
        let select = system_table("databases")
            .column(Expr::count_star())
            .filter(Expr::col("name").equals(name));
        let sql = self.visitor().render_select(&select)?;
        let result = self.query_with(&sql, &QueryOptions::default().without_database())?;
        Ok(cell_u64(result.scalar()) > 0)
    }

    /// `GET /ping`; the server answers `Ok.`
    pub fn ping(&self) -> Result<bool, AdapterError> {
        let response = self.transport().get("/ping")?;
        Ok(response.status == 200 && String::from_utf8_lossy(&response.body).trim() == "Ok.")
    }
}

impl<T: Transport> Introspect for ClickhouseAdapter<T> {
    fn describe(&self, table: &str) -> Result<Vec<ColumnMeta>, AdapterError> {
        self.columns(table)
    }
}
