//! ClickHouse adapter façade
//!
//! Ties the renderer, formatter, DDL generator and response decoder to an
//! injected HTTP transport. One statement is one blocking `post`; nothing is
//! retried.

mod introspection;
mod migration;
mod settings;
mod spool;
mod transport;

#[cfg(test)]
mod tests;

pub use introspection::IndexInfo;
pub use migration::MigrationContext;
pub use settings::{ScopeFrame, ScopeGuard, ScopedStack};
pub use transport::{Headers, Transport, WireResponse};

use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Instant;

use indexmap::IndexMap;
use semver::Version;
use serde_json::Value as JsonValue;

use crate::compression;
use crate::config::ConnectionConfig;
use crate::constants::{
    HEADER_KEY, HEADER_USER, MIN_REQUEST_COMPRESSION_BYTES, MIN_VERSION_ALTER_UPDATE,
    MIN_VERSION_LIGHTWEIGHT_DELETE, PARAM_HTTP_COMPRESSION,
};
use crate::error::AdapterError;
use crate::format;
use crate::response::{self, Decoded, DecodedResult, RequestContext};
use crate::schema::{DropOptions, SchemaCreation, TableDefinition};
use crate::sql::{ClickhouseVisitor, SelectStatement, Statement};
use crate::types::TypeRegistry;

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Settings for this call only; override configured and scoped settings
    pub settings: IndexMap<String, String>,
    /// Setting names to leave out of the query string
    pub exclude_settings: Vec<String>,
    /// Response format override
    pub format: Option<String>,
    /// Omit `database=` (database-level DDL)
    pub skip_database: bool,
}

impl QueryOptions {
    pub fn setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.settings.insert(key.into(), value.to_string());
        self
    }

    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.exclude_settings.push(key.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn without_database(mut self) -> Self {
        self.skip_database = true;
        self
    }
}

/// Parse `23.8.2.7`-style server versions; missing components count as zero
pub fn parse_server_version(text: &str) -> Result<Version, AdapterError> {
    let mut parts = [0u64; 3];
    for (slot, component) in parts.iter_mut().zip(text.trim().split('.')) {
        *slot = component
            .parse()
            .map_err(|_| AdapterError::decode("server version", text))?;
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// ClickHouse adapter over a blocking HTTP transport
pub struct ClickhouseAdapter<T: Transport> {
    transport: T,
    config: ConnectionConfig,
    visitor: ClickhouseVisitor,
    registry: &'static TypeRegistry,
    scopes: ScopedStack,
    server_version: OnceLock<Version>,
}

impl<T: Transport> ClickhouseAdapter<T> {
    pub fn new(transport: T, config: ConnectionConfig) -> Result<Self, AdapterError> {
        config.validate()?;

        tracing::debug!(
            url = %config.base_url(),
            database = %config.database,
            compression = ?config.compression,
            cluster = ?config.cluster,
            distributed_service_tables = %config.distributed_service_tables,
            "ClickhouseAdapter initialized"
        );

        Ok(Self {
            transport,
            config,
            visitor: ClickhouseVisitor::new(),
            registry: TypeRegistry::global(),
            scopes: ScopedStack::new(),
            server_version: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn visitor(&self) -> &ClickhouseVisitor {
        &self.visitor
    }

    pub fn registry(&self) -> &'static TypeRegistry {
        self.registry
    }

    /// Push a settings/format scope for the calling thread; it ends when the guard is dropped
    pub fn scope(&self, frame: ScopeFrame) -> ScopeGuard<'_> {
        self.scopes.push(frame)
    }

    /// Run `f` with extra settings on every request it makes from this thread
    pub fn with_settings<K, V, R>(
        &self,
        settings: impl IntoIterator<Item = (K, V)>,
        f: impl FnOnce(&Self) -> R,
    ) -> R
    where
        K: Into<String>,
        V: ToString,
    {
        let _guard = self.scopes.push(ScopeFrame::settings(settings));
        f(self)
    }

    /// Run `f` with a different response format
    pub fn with_response_format<R>(&self, format: &str, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.scopes.push(ScopeFrame::format(format));
        f(self)
    }

    // =========================================================================
    // Request building
    // =========================================================================

    /// Path and query string for a request
    pub fn request_path(&self, options: &QueryOptions) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if !options.skip_database {
            query.append_pair("database", &self.config.database);
        }

        let mut settings = self.config.settings.clone();
        settings.extend(self.scopes.settings());
        settings.extend(options.settings.clone());
        for (key, value) in &settings {
            if !options.exclude_settings.iter().any(|excluded| excluded == key) {
                query.append_pair(key, value);
            }
        }

        if self.config.compression.is_some() {
            query.append_pair(PARAM_HTTP_COMPRESSION, "1");
        }

        let query = query.finish();
        if query.is_empty() {
            "/".to_string()
        } else {
            format!("/?{}", query)
        }
    }

    /// Request headers; `content_encoding` is set when the body is compressed
    pub fn headers(&self, content_encoding: Option<&str>) -> Headers {
        let mut headers = Headers::new();
        if let Some(user) = &self.config.username {
            headers.push((HEADER_USER.to_string(), user.clone()));
        }
        if let Some(key) = &self.config.password {
            headers.push((HEADER_KEY.to_string(), key.clone()));
        }
        if self.config.compression.is_some() {
            headers.push(("Accept-Encoding".to_string(), compression::accept_encoding()));
        }
        if let Some(encoding) = content_encoding {
            headers.push(("Content-Encoding".to_string(), encoding.to_string()));
        }
        headers
    }

    /// Compress large request bodies with the configured method
    fn encode_body<'a>(&self, sql: &'a str) -> (Cow<'a, [u8]>, Option<&str>) {
        match self.config.compression.as_deref() {
            Some(method) if sql.len() >= MIN_REQUEST_COMPRESSION_BYTES => {
                match compression::compress(sql.as_bytes(), method) {
                    Cow::Owned(body) => (Cow::Owned(body), Some(method)),
                    Cow::Borrowed(body) => (Cow::Borrowed(body), None),
                }
            }
            _ => (Cow::Borrowed(sql.as_bytes()), None),
        }
    }

    fn effective_format(&self, options: &QueryOptions) -> String {
        options
            .format
            .clone()
            .or_else(|| self.scopes.format())
            .unwrap_or_else(|| self.config.response_format.clone())
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn execute(&self, sql: &str) -> Result<Decoded, AdapterError> {
        self.execute_with(sql, &QueryOptions::default())
    }

    /// Format, send and decode one statement
    pub fn execute_with(&self, sql: &str, options: &QueryOptions) -> Result<Decoded, AdapterError> {
        let format = self.effective_format(options);
        let statement = format::apply_format(sql, &format);
        let ctx = RequestContext::new(
            statement.as_str(),
            format::response_format(sql, &format).as_deref(),
        );
        let path = self.request_path(options);
        let (body, encoding) = self.encode_body(&statement);
        let headers = self.headers(encoding);

        let started = Instant::now();
        let response = self.transport.post(&path, &body, &headers)?;
        tracing::debug!(
            sql = %statement,
            format = ?ctx.format,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Executed statement"
        );

        response::decode(&response, &ctx)
    }

    /// Execute and require a tabular result; an empty body yields no rows
    pub fn query(&self, sql: &str) -> Result<DecodedResult, AdapterError> {
        self.query_with(sql, &QueryOptions::default())
    }

    pub fn query_with(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<DecodedResult, AdapterError> {
        match self.execute_with(sql, options)? {
            Decoded::Tabular(result) => Ok(result),
            Decoded::Raw(text) if text.trim().is_empty() => Ok(DecodedResult::default()),
            Decoded::Raw(text) => Err(AdapterError::decode(
                self.effective_format(options),
                text.chars().take(200).collect::<String>(),
            )),
        }
    }

    /// First column of the first row
    pub fn select_value(&self, sql: &str) -> Result<Option<JsonValue>, AdapterError> {
        Ok(self.query(sql)?.scalar().cloned())
    }

    /// First column of every row, as strings
    pub fn select_strings(&self, sql: &str) -> Result<Vec<String>, AdapterError> {
        let result = self.query(sql)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(|value| match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect())
    }

    /// Statements without a result set
    pub fn execute_ddl(&self, sql: &str) -> Result<(), AdapterError> {
        self.execute(sql).map(|_| ())
    }

    // =========================================================================
    // Query trees
    // =========================================================================

    /// Render a statement, rejecting mutations the server cannot run
    pub fn render(&self, statement: &Statement) -> Result<String, AdapterError> {
        match statement {
            Statement::Update(_) => {
                self.require_version(MIN_VERSION_ALTER_UPDATE, "ALTER TABLE ... UPDATE")?
            }
            Statement::Delete(_) => {
                self.require_version(MIN_VERSION_LIGHTWEIGHT_DELETE, "DELETE FROM")?
            }
            Statement::Select(_) | Statement::Insert(_) => {}
        }
        self.visitor.render(statement)
    }

    pub fn execute_statement(&self, statement: &Statement) -> Result<Decoded, AdapterError> {
        let sql = self.render(statement)?;
        self.execute(&sql)
    }

    pub fn select(&self, select: &SelectStatement) -> Result<DecodedResult, AdapterError> {
        let sql = self.visitor.render_select(select)?;
        self.query(&sql)
    }

    // =========================================================================
    // Server version
    // =========================================================================

    /// Server version, fetched once per adapter
    pub fn server_version(&self) -> Result<Version, AdapterError> {
        if let Some(version) = self.server_version.get() {
            return Ok(version.clone());
        }
        let text = match self.select_value("SELECT version()")? {
            Some(JsonValue::String(text)) => text,
            Some(other) => other.to_string(),
            None => return Err(AdapterError::decode("server version", "<empty>")),
        };
        let version = parse_server_version(&text)?;
        tracing::debug!(version = %version, "Detected ClickHouse server version");
        Ok(self.server_version.get_or_init(|| version).clone())
    }

    pub fn supports(&self, min: (u64, u64, u64)) -> Result<bool, AdapterError> {
        Ok(self.server_version()? >= Version::new(min.0, min.1, min.2))
    }

    fn require_version(&self, min: (u64, u64, u64), feature: &str) -> Result<(), AdapterError> {
        if self.supports(min)? {
            return Ok(());
        }
        Err(AdapterError::unsupported(format!(
            "{} requires ClickHouse {}.{}.{} or newer (server is {})",
            feature,
            min.0,
            min.1,
            min.2,
            self.server_version()?
        )))
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// DDL generator configured from this connection
    pub fn schema(&self) -> SchemaCreation<'_> {
        SchemaCreation::new(self.config.ddl_options()).with_introspect(self)
    }

    pub fn create_table(&self, def: &TableDefinition) -> Result<(), AdapterError> {
        for sql in self.schema().create_table(def)? {
            self.execute_ddl(&sql)?;
        }
        tracing::debug!(table = %def.name, distributed = def.distributed.is_some(), "Created table");
        Ok(())
    }

    pub fn drop_table(&self, def: &TableDefinition, options: DropOptions) -> Result<(), AdapterError> {
        for sql in self.schema().drop_table_definition(def, options) {
            self.execute_ddl(&sql)?;
        }
        tracing::debug!(table = %def.name, "Dropped table");
        Ok(())
    }

    pub fn create_database(&self, name: &str, if_not_exists: bool) -> Result<(), AdapterError> {
        let sql = self.schema().create_database(name, if_not_exists, None);
        self.execute_with(&sql, &QueryOptions::default().without_database())?;
        tracing::debug!(database = %name, "Created database");
        Ok(())
    }

    pub fn drop_database(&self, name: &str, if_exists: bool) -> Result<(), AdapterError> {
        let sql = self.schema().drop_database(name, if_exists);
        self.execute_with(&sql, &QueryOptions::default().without_database())?;
        tracing::debug!(database = %name, "Dropped database");
        Ok(())
    }

    pub fn migration_context(&self) -> MigrationContext<'_, T> {
        MigrationContext::new(self)
    }
}
