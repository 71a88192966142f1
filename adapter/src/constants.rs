// =============================================================================
// Connection Defaults
// =============================================================================

/// Default ClickHouse host
pub const DEFAULT_HOST: &str = "localhost";

/// Default ClickHouse HTTP port
pub const DEFAULT_PORT: u16 = 8123;

/// Default ClickHouse HTTPS port
pub const DEFAULT_SSL_PORT: u16 = 8443;

/// Default read timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Default write timeout in seconds
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 60;

/// Format requested for statements that return rows
pub const DEFAULT_RESPONSE_FORMAT: &str = "JSONCompact";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for the config file path
pub const ENV_CONFIG: &str = "CLICKHOUSE_CONFIG";

/// Environment variable for the server host
pub const ENV_HOST: &str = "CLICKHOUSE_HOST";

/// Environment variable for the server port
pub const ENV_PORT: &str = "CLICKHOUSE_PORT";

/// Environment variable for the database name
pub const ENV_DATABASE: &str = "CLICKHOUSE_DATABASE";

/// Environment variable for the username
pub const ENV_USERNAME: &str = "CLICKHOUSE_USER";

/// Environment variable for the password
pub const ENV_PASSWORD: &str = "CLICKHOUSE_PASSWORD";

/// Environment variable for the cluster name
pub const ENV_CLUSTER: &str = "CLICKHOUSE_CLUSTER";

// =============================================================================
// Schema Defaults
// =============================================================================

/// Engine used when a table definition names none
pub const DEFAULT_ENGINE: &str = "Log";

/// Engine used for temporary tables without an explicit engine
pub const DEFAULT_TEMPORARY_ENGINE: &str = "Memory";

/// Sharding key for distributed companions without one
pub const DEFAULT_SHARDING_KEY: &str = "rand()";

/// Suffix for distributed service tables
pub const DEFAULT_DISTRIBUTED_SUFFIX: &str = "_distributed";

/// Replica path template; `{database}` and `{table}` are filled in per table
pub const DEFAULT_REPLICA_PATH: &str = "/clickhouse/tables/{shard}/{database}.{table}";

/// Migration versions table
pub const SCHEMA_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Internal metadata key/value table
pub const INTERNAL_METADATA_TABLE: &str = "ar_internal_metadata";

// =============================================================================
// Wire Protocol
// =============================================================================

/// Marker of a server exception embedded in a response body
pub const EXCEPTION_MARKER: &str = "DB::Exception";

/// Header carrying the username
pub const HEADER_USER: &str = "X-ClickHouse-User";

/// Header carrying the password
pub const HEADER_KEY: &str = "X-ClickHouse-Key";

/// Query string parameter enabling compressed responses
pub const PARAM_HTTP_COMPRESSION: &str = "enable_http_compression";

// =============================================================================
// Server Capabilities
// =============================================================================

/// First server version with `ALTER TABLE ... UPDATE`
pub const MIN_VERSION_ALTER_UPDATE: (u64, u64, u64) = (18, 12, 14);

/// First server version with lightweight `DELETE FROM`
pub const MIN_VERSION_LIGHTWEIGHT_DELETE: (u64, u64, u64) = (22, 8, 0);

/// Request bodies shorter than this are sent uncompressed
pub const MIN_REQUEST_COMPRESSION_BYTES: usize = 1024;
