//! Adapter error types
//!
//! Every failure surfaced by the adapter maps onto one `AdapterError` variant.
//! Server-side failures always carry the SQL text and the raw response body so
//! they can be diagnosed without re-running the statement.

use thiserror::Error;

/// Unified error type for rendering, decoding and execution
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The server reports that the target database does not exist
    #[error("Database does not exist: {message} (query: {sql})")]
    NoDatabase { message: String, sql: String },

    /// The server reports that the database being created already exists
    #[error("Database already exists: {message} (query: {sql})")]
    DatabaseAlreadyExists { message: String, sql: String },

    /// Any other server failure, including exceptions embedded in a 200 body
    #[error("ClickHouse error (status {status}): {message}\nquery: {sql}")]
    Database {
        status: u16,
        message: String,
        sql: String,
    },

    /// Construct that has no ClickHouse rendering, or a server too old for it
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed tree, definition or configuration, rejected at construction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Type string without a codec
    #[error("Unsupported ClickHouse type: {type_name}")]
    UnsupportedType { type_name: String },

    /// A wire value that does not fit its declared type
    #[error("Cannot decode {value} as {type_name}")]
    Decode { type_name: String, value: String },

    /// Transport-level failure reported by the HTTP collaborator
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO error (result spooling)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Create a generic database error
    pub fn database(status: u16, message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Database {
            status,
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    /// Create an unsupported type error
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create a decode error for a value that does not match its type
    pub fn decode(type_name: impl Into<String>, value: impl ToString) -> Self {
        Self::Decode {
            type_name: type_name.into(),
            value: value.to_string(),
        }
    }

    /// Whether the error originated on the server
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::NoDatabase { .. } | Self::DatabaseAlreadyExists { .. } | Self::Database { .. }
        )
    }
}

/// Errors raised by an HTTP transport implementation
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display_includes_query() {
        let err = AdapterError::database(500, "Code: 62. DB::Exception: Syntax error", "SELECT (");
        let text = err.to_string();
        assert!(text.contains("status 500"));
        assert!(text.contains("Syntax error"));
        assert!(text.contains("SELECT ("));
    }

    #[test]
    fn test_no_database_display() {
        let err = AdapterError::NoDatabase {
            message: "Database missing doesn't exist".to_string(),
            sql: "SELECT 1".to_string(),
        };
        assert!(err.to_string().contains("missing"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_timeout_error_display() {
        let err = TransportError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Request timeout after 30s");
    }

    #[test]
    fn test_transport_error_from() {
        let err: AdapterError = TransportError::Connection("refused".to_string()).into();
        assert_eq!(err.to_string(), "Transport error: Connection error: refused");
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "spool missing");
        let err: AdapterError = io_err.into();
        assert!(err.to_string().contains("spool missing"));
    }

    #[test]
    fn test_error_debug() {
        let err = AdapterError::unsupported_type("Object('json')");
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("UnsupportedType"));
        assert!(debug_str.contains("Object('json')"));
    }
}
