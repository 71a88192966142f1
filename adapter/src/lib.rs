//! ClickHouse adapter core
//!
//! SQL dialect rendering, DDL generation, type mapping and response decoding
//! for ClickHouse over its HTTP interface. The network itself is behind the
//! [`Transport`] trait.

pub mod adapter;
pub mod compression;
pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod response;
pub mod schema;
pub mod sql;
pub mod types;

pub use adapter::{ClickhouseAdapter, QueryOptions, Transport};
pub use config::{ConnectionConfig, FileConfig};
pub use error::{AdapterError, TransportError};
pub use response::{ColumnMeta, Decoded, DecodedResult, WireResponse};
pub use types::{ClickhouseType, TypeRegistry, Value};
