//! ClickHouse type system
//!
//! Type strings are parsed once and cached in a process-wide registry; lookups
//! are safe from any thread.

mod codec;
mod parse;
mod value;

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde_json::Value as JsonValue;

pub use codec::AggregateInfo;
pub use parse::{ClickhouseType, TupleField};
pub use value::{
    Value, decimal_literal, float_literal, plain_decimal, quote_identifier, quote_string,
};

use crate::error::AdapterError;

static GLOBAL_REGISTRY: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);

/// Cache of parsed type strings
#[derive(Debug, Default)]
pub struct TypeRegistry {
    cache: DashMap<String, Arc<ClickhouseType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL_REGISTRY
    }

    /// Resolve a type string to its parsed form
    ///
    /// Resolution is pure and deterministic; failures are not cached.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<ClickhouseType>, AdapterError> {
        let key = type_name.trim();
        if let Some(ty) = self.cache.get(key) {
            return Ok(Arc::clone(ty.value()));
        }
        let ty = Arc::new(ClickhouseType::parse(key)?);
        self.cache.insert(key.to_string(), Arc::clone(&ty));
        Ok(ty)
    }

    /// Decode a wire value declared as `type_name`
    pub fn decode(&self, type_name: &str, wire: &JsonValue) -> Result<Value, AdapterError> {
        self.resolve(type_name)?.decode(wire)
    }

    /// Render a host value as a literal of `type_name`
    pub fn encode_literal(&self, type_name: &str, value: &Value) -> Result<String, AdapterError> {
        self.resolve(type_name)?.encode_literal(value)
    }

    /// Aggregate-function metadata of `type_name`, if it is an aggregate state
    pub fn aggregate_info(&self, type_name: &str) -> Result<Option<AggregateInfo>, AdapterError> {
        Ok(self.resolve(type_name)?.aggregate_info())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
