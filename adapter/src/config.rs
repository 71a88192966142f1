//! Connection configuration
//!
//! Values are layered: JSON config file, then `CLICKHOUSE_*` environment
//! variables, then explicit overrides from the caller. The merged file-level
//! view (`FileConfig`, every field optional) is resolved into the runtime
//! `ConnectionConfig` with defaults from `constants`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::compression;
use crate::constants::{
    DEFAULT_DISTRIBUTED_SUFFIX, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS,
    DEFAULT_RESPONSE_FORMAT, DEFAULT_SSL_PORT, DEFAULT_WRITE_TIMEOUT_SECS, ENV_CLUSTER,
    ENV_CONFIG, ENV_DATABASE, ENV_HOST, ENV_PASSWORD, ENV_PORT, ENV_USERNAME,
};
use crate::error::AdapterError;
use crate::schema::DdlOptions;

// =============================================================================
// File Config
// =============================================================================

/// Connection section as read from a JSON file or the environment
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Database name (required once all layers are merged)
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use HTTPS
    pub ssl: Option<bool>,
    /// CA bundle path for HTTPS
    pub sslca: Option<String>,
    /// Read timeout in seconds
    pub read_timeout: Option<u64>,
    /// Write timeout in seconds
    pub write_timeout: Option<u64>,
    /// Cluster for `ON CLUSTER` DDL
    pub cluster_name: Option<String>,
    /// Create migration tables with `Distributed` companions (requires a cluster)
    pub distributed_service_tables: Option<bool>,
    pub distributed_service_tables_suffix: Option<String>,
    /// Replica name for `Replicated*MergeTree` engines, e.g. `{replica}`
    pub replica_name: Option<String>,
    pub replica_path: Option<String>,
    /// Response compression method (gzip, deflate, zstd, lz4)
    pub compression: Option<String>,
    /// Server settings sent with every request
    pub settings: Option<IndexMap<String, serde_json::Value>>,
    /// Format requested for row-returning statements
    pub response_format: Option<String>,
}

impl FileConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(host = ?config.host, database = ?config.database, "Parsed config file");
        Ok(config)
    }

    /// Values from `CLICKHOUSE_*` environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let port = var(ENV_PORT).and_then(|port| match port.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(value = %port, "Ignoring invalid {}", ENV_PORT);
                None
            }
        });
        Self {
            host: var(ENV_HOST),
            port,
            database: var(ENV_DATABASE),
            username: var(ENV_USERNAME),
            password: var(ENV_PASSWORD),
            cluster_name: var(ENV_CLUSTER),
            ..Self::default()
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    pub fn merge(&mut self, other: FileConfig) {
        if other.host.is_some() {
            tracing::trace!(host = ?other.host, "Merging host");
            self.host = other.host;
        }
        if other.port.is_some() {
            tracing::trace!(port = ?other.port, "Merging port");
            self.port = other.port;
        }
        if other.database.is_some() {
            tracing::trace!(database = ?other.database, "Merging database");
            self.database = other.database;
        }
        if other.username.is_some() {
            tracing::trace!(username = "***", "Merging username");
            self.username = other.username;
        }
        if other.password.is_some() {
            tracing::trace!(password = "***", "Merging password");
            self.password = other.password;
        }
        if other.ssl.is_some() {
            tracing::trace!(ssl = ?other.ssl, "Merging ssl");
            self.ssl = other.ssl;
        }
        if other.sslca.is_some() {
            tracing::trace!(sslca = ?other.sslca, "Merging sslca");
            self.sslca = other.sslca;
        }
        if other.read_timeout.is_some() {
            tracing::trace!(read_timeout = ?other.read_timeout, "Merging read_timeout");
            self.read_timeout = other.read_timeout;
        }
        if other.write_timeout.is_some() {
            tracing::trace!(write_timeout = ?other.write_timeout, "Merging write_timeout");
            self.write_timeout = other.write_timeout;
        }
        if other.cluster_name.is_some() {
            tracing::trace!(cluster_name = ?other.cluster_name, "Merging cluster_name");
            self.cluster_name = other.cluster_name;
        }
        if other.distributed_service_tables.is_some() {
            tracing::trace!(distributed_service_tables = ?other.distributed_service_tables, "Merging distributed_service_tables");
            self.distributed_service_tables = other.distributed_service_tables;
        }
        if other.distributed_service_tables_suffix.is_some() {
            tracing::trace!(suffix = ?other.distributed_service_tables_suffix, "Merging distributed_service_tables_suffix");
            self.distributed_service_tables_suffix = other.distributed_service_tables_suffix;
        }
        if other.replica_name.is_some() {
            tracing::trace!(replica_name = ?other.replica_name, "Merging replica_name");
            self.replica_name = other.replica_name;
        }
        if other.replica_path.is_some() {
            tracing::trace!(replica_path = ?other.replica_path, "Merging replica_path");
            self.replica_path = other.replica_path;
        }
        if other.compression.is_some() {
            tracing::trace!(compression = ?other.compression, "Merging compression");
            self.compression = other.compression;
        }
        if let Some(settings) = other.settings {
            tracing::trace!(settings = ?settings, "Merging settings");
            self.settings.get_or_insert_with(IndexMap::new).extend(settings);
        }
        if other.response_format.is_some() {
            tracing::trace!(response_format = ?other.response_format, "Merging response_format");
            self.response_format = other.response_format;
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// Connection configuration (final/runtime)
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    pub sslca: Option<String>,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// Cluster name (None = single-node mode)
    pub cluster: Option<String>,
    pub distributed_service_tables: bool,
    pub distributed_service_tables_suffix: String,
    pub replica_name: Option<String>,
    pub replica_path: Option<String>,
    pub compression: Option<String>,
    /// Server settings sent as query-string parameters
    pub settings: IndexMap<String, String>,
    pub response_format: String,
}

impl ConnectionConfig {
    /// Defaults for everything but the database
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: database.into(),
            username: None,
            password: None,
            ssl: false,
            sslca: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            cluster: None,
            distributed_service_tables: false,
            distributed_service_tables_suffix: DEFAULT_DISTRIBUTED_SUFFIX.to_string(),
            replica_name: None,
            replica_path: None,
            compression: None,
            settings: IndexMap::new(),
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
        }
    }

    /// Load configuration: JSON file, then environment, then `overrides`
    ///
    /// The file is `path` when given, else the file named by `CLICKHOUSE_CONFIG`
    /// if that variable is set.
    pub fn load(path: Option<&Path>, overrides: FileConfig) -> Result<Self> {
        dotenvy::dotenv().ok();
        tracing::debug!("Loading ClickHouse connection configuration");

        let mut file_config = FileConfig::default();
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            file_config.merge(FileConfig::load_from_file(&path)?);
        }
        file_config.merge(FileConfig::from_env());
        file_config.merge(overrides);

        let config =
            Self::from_file_config(file_config).context("Invalid ClickHouse configuration")?;
        tracing::debug!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            cluster = ?config.cluster,
            "ClickHouse configuration loaded"
        );
        Ok(config)
    }

    /// Resolve a merged file config against defaults and validate it
    pub fn from_file_config(file: FileConfig) -> Result<Self, AdapterError> {
        let ssl = file.ssl.unwrap_or(false);
        let default_port = if ssl { DEFAULT_SSL_PORT } else { DEFAULT_PORT };
        let settings = file
            .settings
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Bool(b) => u8::from(b).to_string(),
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        let config = Self {
            host: file.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: file.port.unwrap_or(default_port),
            database: file.database.unwrap_or_default(),
            username: file.username,
            password: file.password,
            ssl,
            sslca: file.sslca,
            read_timeout_secs: file.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            write_timeout_secs: file.write_timeout.unwrap_or(DEFAULT_WRITE_TIMEOUT_SECS),
            cluster: file.cluster_name,
            distributed_service_tables: file.distributed_service_tables.unwrap_or(false),
            distributed_service_tables_suffix: file
                .distributed_service_tables_suffix
                .unwrap_or_else(|| DEFAULT_DISTRIBUTED_SUFFIX.to_string()),
            replica_name: file.replica_name,
            replica_path: file.replica_path,
            compression: file.compression,
            settings,
            response_format: file
                .response_format
                .unwrap_or_else(|| DEFAULT_RESPONSE_FORMAT.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.database.trim().is_empty() {
            return Err(AdapterError::invalid("database is required"));
        }
        if self.distributed_service_tables && self.cluster.is_none() {
            return Err(AdapterError::invalid(
                "distributed_service_tables requires cluster_name",
            ));
        }
        if let Some(method) = &self.compression
            && !compression::is_supported(method)
        {
            return Err(AdapterError::invalid(format!(
                "unsupported compression method: {}",
                method
            )));
        }
        Ok(())
    }

    /// `http(s)://host:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Suffix of distributed service tables, when enabled
    pub fn service_table_suffix(&self) -> Option<&str> {
        self.distributed_service_tables
            .then_some(self.distributed_service_tables_suffix.as_str())
    }

    pub fn ddl_options(&self) -> DdlOptions {
        let mut options = DdlOptions::new(&self.database);
        if let Some(cluster) = &self.cluster {
            options = options.cluster(cluster);
        }
        if let Some(replica) = &self.replica_name {
            options = options.replica(replica, self.replica_path.as_deref());
        }
        options
    }
}
