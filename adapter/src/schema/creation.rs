//! CREATE TABLE / VIEW rendering and ALTER operations on columns and indexes

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use super::column::{ColumnSql, default_sql};
use super::definition::{
    ColumnDefinition, DistributedOptions, IndexDefinition, IndexPosition, TableDefinition,
    TableKind,
};
use crate::constants::{
    DEFAULT_ENGINE, DEFAULT_REPLICA_PATH, DEFAULT_SHARDING_KEY, DEFAULT_TEMPORARY_ENGINE,
};
use crate::error::AdapterError;
use crate::response::ColumnMeta;
use crate::types::{quote_identifier, quote_string};

/// Catalog lookups needed while rendering DDL
pub trait Introspect {
    /// Columns of `table` in the current database, in declaration order
    fn describe(&self, table: &str) -> Result<Vec<ColumnMeta>, AdapterError>;
}

/// Replication settings applied to `*MergeTree` engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOptions {
    /// Replica name, usually the `{replica}` macro
    pub name: String,
    /// ZooKeeper path template; `{database}` and `{table}` are substituted
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdlOptions {
    pub cluster: Option<String>,
    pub database: String,
    pub replica: Option<ReplicaOptions>,
}

impl DdlOptions {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn replica(mut self, name: impl Into<String>, path: Option<&str>) -> Self {
        self.replica = Some(ReplicaOptions {
            name: name.into(),
            path: path.map(str::to_string),
        });
        self
    }
}

fn from_table_pattern() -> &'static Regex {
    static RE_FROM_TABLE: OnceLock<Regex> = OnceLock::new();
    RE_FROM_TABLE.get_or_init(|| {
        Regex::new(r"(?i)\bFROM\s+(`[^`]+`|[A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex")
    })
}

/// `FROM` used as a keyword argument, as in `EXTRACT(DAY FROM ts)`
fn from_argument_pattern() -> &'static Regex {
    static RE_FROM_ARGUMENT: OnceLock<Regex> = OnceLock::new();
    RE_FROM_ARGUMENT.get_or_init(|| {
        Regex::new(r"(?i)\b(EXTRACT|TRIM|SUBSTRING)\s*\([^()]*$").expect("Invalid regex")
    })
}

/// Byte ranges of quoted literals, quoted identifiers and comments
fn opaque_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' {
                        i += 2;
                    } else if bytes[i] == quote && bytes.get(i + 1) == Some(&quote) {
                        i += 2;
                    } else if bytes[i] == quote {
                        break;
                    } else {
                        i += 1;
                    }
                }
                i = (i + 1).min(bytes.len());
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
            }
            _ => {
                i += 1;
                continue;
            }
        }
        spans.push(start..i);
    }
    spans
}

fn merge_tree_pattern() -> &'static Regex {
    static RE_MERGE_TREE: OnceLock<Regex> = OnceLock::new();
    RE_MERGE_TREE.get_or_init(|| Regex::new(r"^\w*MergeTree$").expect("Invalid regex"))
}

/// Split `Name(args) rest` into its parts; `args` is `None` without parentheses
fn split_engine(engine: &str) -> (&str, Option<&str>, &str) {
    let engine = engine.trim();
    let name_end = engine
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(engine.len());
    let (name, rest) = engine.split_at(name_end);
    if !rest.starts_with('(') {
        return (name, None, rest);
    }
    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return (name, Some(&rest[1..i]), &rest[i + 1..]);
                }
            }
            _ => {}
        }
    }
    (name, None, rest)
}

/// DDL generator bound to a database, an optional cluster and replication
/// settings
pub struct SchemaCreation<'a> {
    options: DdlOptions,
    introspect: Option<&'a dyn Introspect>,
}

impl<'a> SchemaCreation<'a> {
    pub fn new(options: DdlOptions) -> Self {
        Self {
            options,
            introspect: None,
        }
    }

    pub fn with_introspect(mut self, introspect: &'a dyn Introspect) -> Self {
        self.introspect = Some(introspect);
        self
    }

    pub fn options(&self) -> &DdlOptions {
        &self.options
    }

    /// ` ON CLUSTER c`, or empty without a cluster; macros are quoted
    pub fn on_cluster(&self) -> String {
        match self.options.cluster.as_deref() {
            Some(cluster) if cluster.starts_with('{') => format!(" ON CLUSTER '{}'", cluster),
            Some(cluster) => format!(" ON CLUSTER {}", cluster),
            None => String::new(),
        }
    }

    /// Create statements for a table or view, followed by its distributed
    /// companion when one is configured
    pub fn create_table(&self, def: &TableDefinition) -> Result<Vec<String>, AdapterError> {
        if def.is_view() {
            if def.distributed.is_some() {
                return Err(AdapterError::invalid(format!(
                    "view {} cannot have a distributed companion",
                    def.name
                )));
            }
            return Ok(vec![self.create_view(def)?]);
        }

        let mut statements = vec![self.create_base_table(def)?];
        if let Some(distributed) = &def.distributed {
            statements.push(self.create_distributed(def, distributed)?);
        }
        Ok(statements)
    }

    fn create_base_table(&self, def: &TableDefinition) -> Result<String, AdapterError> {
        let mut sql = String::from("CREATE ");
        if def.temporary {
            sql.push_str("TEMPORARY ");
        }
        sql.push_str("TABLE ");
        if def.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&def.name);
        if !def.temporary {
            sql.push_str(&self.on_cluster());
        }

        let mut elements: Vec<String> = def
            .columns
            .iter()
            .map(|column| ColumnSql::from_definition(column, false).render())
            .collect();
        if !def.primary_key.is_empty() {
            elements.push(format!("PRIMARY KEY ({})", def.primary_key.join(", ")));
        }
        elements.extend(def.indexes.iter().map(|index| format!("INDEX {}", index_body(index))));
        if !elements.is_empty() {
            sql.push_str(&format!(" ({})", elements.join(", ")));
        }

        let default_engine = if def.temporary {
            DEFAULT_TEMPORARY_ENGINE
        } else {
            DEFAULT_ENGINE
        };
        let engine = def.engine.as_deref().unwrap_or(default_engine);
        sql.push_str(&format!(" ENGINE = {}", self.resolve_engine(&def.name, engine)));

        if let Some(partition_by) = &def.partition_by {
            sql.push_str(&format!(" PARTITION BY {}", partition_by));
        }
        if let Some(order_by) = &def.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }
        if let Some(sample_by) = &def.sample_by {
            sql.push_str(&format!(" SAMPLE BY {}", sample_by));
        }
        if let Some(ttl) = &def.ttl {
            sql.push_str(&format!(" TTL {}", ttl));
        }
        if !def.settings.is_empty() {
            let settings: Vec<String> = def
                .settings
                .iter()
                .map(|(k, v)| format!("{} = {}", k, v))
                .collect();
            sql.push_str(&format!(" SETTINGS {}", settings.join(", ")));
        }
        if let Some(comment) = &def.comment {
            sql.push_str(&format!(" COMMENT {}", quote_string(comment)));
        }
        if let Some(query) = &def.as_query {
            sql.push_str(&format!(" AS {}", self.qualify_query(query)));
        }
        Ok(sql)
    }

    fn create_view(&self, def: &TableDefinition) -> Result<String, AdapterError> {
        let query = def
            .as_query
            .as_deref()
            .ok_or_else(|| AdapterError::invalid(format!("view {} needs a query", def.name)))?;

        let mut sql = String::from("CREATE ");
        if def.kind == TableKind::MaterializedView {
            sql.push_str("MATERIALIZED ");
        }
        sql.push_str("VIEW ");
        if def.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&def.name);
        sql.push_str(&self.on_cluster());

        if def.kind == TableKind::MaterializedView {
            match (&def.to, &def.engine) {
                (Some(target), _) => sql.push_str(&self.to_clause(target)?),
                (None, Some(engine)) => sql.push_str(&format!(
                    " ENGINE = {}",
                    self.resolve_engine(&def.name, engine)
                )),
                (None, None) => {
                    return Err(AdapterError::invalid(format!(
                        "materialized view {} needs a TO target or an engine",
                        def.name
                    )));
                }
            }
            if def.populate {
                sql.push_str(" POPULATE");
            }
        }

        sql.push_str(&format!(" AS {}", self.qualify_query(query)));
        Ok(sql)
    }

    /// ` TO db.target (cols)`; qualified targets are used as given
    fn to_clause(&self, target: &str) -> Result<String, AdapterError> {
        if target.contains('.') {
            return Ok(format!(" TO {}", target));
        }
        let qualified = format!("{}.{}", self.options.database, target);
        let columns = match self.introspect {
            Some(introspect) => introspect.describe(target)?,
            None => Vec::new(),
        };
        if columns.is_empty() {
            return Ok(format!(" TO {}", qualified));
        }
        let columns: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.type_name))
            .collect();
        Ok(format!(" TO {} ({})", qualified, columns.join(", ")))
    }

    fn create_distributed(
        &self,
        def: &TableDefinition,
        distributed: &DistributedOptions,
    ) -> Result<String, AdapterError> {
        let cluster = self.options.cluster.as_deref().ok_or_else(|| {
            AdapterError::invalid(format!(
                "distributed table {} requires a cluster",
                distributed.table
            ))
        })?;
        let db = &self.options.database;
        let sharding_key = distributed
            .sharding_key
            .as_deref()
            .unwrap_or(DEFAULT_SHARDING_KEY);

        let if_not_exists = if def.if_not_exists { "IF NOT EXISTS " } else { "" };
        Ok(format!(
            "CREATE TABLE {if_not_exists}{dist}{on_cluster} AS {db}.{base} ENGINE = Distributed('{cluster}', '{db}', '{base}', {sharding_key})",
            dist = distributed.table,
            on_cluster = self.on_cluster(),
            base = def.name,
        ))
    }

    /// Rewrite `*MergeTree` engines to their replicated form when a replica is
    /// configured
    pub fn resolve_engine(&self, table: &str, engine: &str) -> String {
        let Some(replica) = &self.options.replica else {
            return engine.to_string();
        };
        let (name, args, rest) = split_engine(engine);
        if !merge_tree_pattern().is_match(name) || name.starts_with("Replicated") {
            return engine.to_string();
        }

        let path = replica
            .path
            .as_deref()
            .unwrap_or(DEFAULT_REPLICA_PATH)
            .replace("{database}", &self.options.database)
            .replace("{table}", table);
        let mut replicated_args = format!("'{}', '{}'", path, replica.name);
        if let Some(args) = args.map(str::trim).filter(|args| !args.is_empty()) {
            replicated_args.push_str(", ");
            replicated_args.push_str(args);
        }
        format!("Replicated{}({}){}", name, replicated_args, rest)
    }

    /// Qualify bare table names after `FROM` with the current database
    ///
    /// Qualified names, subqueries and table functions are left untouched,
    /// as is anything inside string literals and comments.
    pub fn qualify_query(&self, sql: &str) -> String {
        let opaque = opaque_spans(sql);
        let mut out = String::with_capacity(sql.len() + 16);
        let mut last = 0;
        for caps in from_table_pattern().captures_iter(sql) {
            let (Some(keyword), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let next = sql[name.end()..].trim_start().chars().next();
            if matches!(next, Some('.') | Some('('))
                || opaque.iter().any(|span| span.contains(&keyword.start()))
                || from_argument_pattern().is_match(&sql[..keyword.start()])
            {
                continue;
            }
            out.push_str(&sql[last..name.start()]);
            out.push_str(&self.options.database);
            out.push('.');
            last = name.start();
        }
        out.push_str(&sql[last..]);
        out
    }

    fn alter_table(&self, table: &str, action: &str) -> String {
        format!("ALTER TABLE {}{} {}", table, self.on_cluster(), action)
    }

    pub fn add_column(&self, table: &str, column: &ColumnDefinition, if_not_exists: bool) -> String {
        let if_not_exists = if if_not_exists { "IF NOT EXISTS " } else { "" };
        let column = ColumnSql::from_definition(column, true).render();
        self.alter_table(table, &format!("ADD COLUMN {}{}", if_not_exists, column))
    }

    pub fn modify_column(&self, table: &str, column: &ColumnDefinition) -> String {
        let column = ColumnSql::from_definition(column, false).render();
        self.alter_table(table, &format!("MODIFY COLUMN {}", column))
    }

    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        self.alter_table(
            table,
            &format!(
                "RENAME COLUMN {} TO {}",
                quote_identifier(from),
                quote_identifier(to)
            ),
        )
    }

    pub fn drop_column(&self, table: &str, column: &str, if_exists: bool) -> String {
        let if_exists = if if_exists { "IF EXISTS " } else { "" };
        self.alter_table(
            table,
            &format!("DROP COLUMN {}{}", if_exists, quote_identifier(column)),
        )
    }

    /// `MODIFY COLUMN c DEFAULT x`, or `REMOVE DEFAULT` when the column has none
    pub fn change_column_default(&self, table: &str, column: &ColumnDefinition) -> String {
        let name = quote_identifier(&column.name);
        let action = match &column.default {
            Some(default) => {
                let ty = ColumnSql::from_definition(column, false).ty;
                format!("MODIFY COLUMN {} DEFAULT {}", name, default_sql(&ty, default))
            }
            None => format!("MODIFY COLUMN {} REMOVE DEFAULT", name),
        };
        self.alter_table(table, &action)
    }

    pub fn add_index(&self, table: &str, index: &IndexDefinition) -> String {
        let if_not_exists = if index.if_not_exists { "IF NOT EXISTS " } else { "" };
        let position = match &index.position {
            Some(IndexPosition::First) => " FIRST".to_string(),
            Some(IndexPosition::After(name)) => format!(" AFTER {}", name),
            None => String::new(),
        };
        self.alter_table(
            table,
            &format!("ADD INDEX {}{}{}", if_not_exists, index_body(index), position),
        )
    }

    pub fn drop_index(&self, table: &str, name: &str, if_exists: bool) -> String {
        let if_exists = if if_exists { "IF EXISTS " } else { "" };
        self.alter_table(table, &format!("DROP INDEX {}{}", if_exists, name))
    }

    pub fn materialize_index(&self, table: &str, name: &str, partition: Option<&str>) -> String {
        self.alter_table(
            table,
            &format!("MATERIALIZE INDEX {}{}", name, in_partition(partition)),
        )
    }

    pub fn clear_index(&self, table: &str, name: &str, partition: Option<&str>) -> String {
        self.alter_table(
            table,
            &format!("CLEAR INDEX {}{}", name, in_partition(partition)),
        )
    }
}

fn in_partition(partition: Option<&str>) -> String {
    partition
        .map(|p| format!(" IN PARTITION {}", p))
        .unwrap_or_default()
}

/// `name (expr) TYPE t [GRANULARITY n]`
fn index_body(index: &IndexDefinition) -> String {
    let mut sql = format!(
        "{} ({}) TYPE {}",
        index.name, index.expression, index.index_type
    );
    if let Some(granularity) = index.granularity {
        sql.push_str(&format!(" GRANULARITY {}", granularity));
    }
    sql
}
