//! Table, column, index and dictionary definitions fed to the DDL generator

use indexmap::IndexMap;

use crate::error::AdapterError;
use crate::types::{ClickhouseType, Value};

/// Abstract column type as requested by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    String,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Date,
    DateTime,
    Uuid,
    Boolean,
    Enum(Vec<(String, i16)>),
    /// Named tuple fields with their type strings
    Tuple(Vec<(String, String)>),
    /// Any ClickHouse type string, used verbatim
    Custom(String),
}

impl ColumnType {
    /// Base type token before any decoration
    pub fn base_sql(&self, options: &ColumnOptions) -> String {
        match self {
            ColumnType::String => match options.limit {
                Some(limit) => format!("String({})", limit),
                None => "String".to_string(),
            },
            ColumnType::Integer | ColumnType::BigInteger => {
                let bytes = match (self, options.limit) {
                    (_, Some(limit)) => limit,
                    (ColumnType::BigInteger, None) => 8,
                    _ => 4,
                };
                let bits = match bytes {
                    0..=1 => 8,
                    2 => 16,
                    3..=4 => 32,
                    5..=8 => 64,
                    9..=16 => 128,
                    _ => 256,
                };
                if options.unsigned.unwrap_or(true) {
                    format!("UInt{}", bits)
                } else {
                    format!("Int{}", bits)
                }
            }
            ColumnType::Float => match options.limit {
                Some(limit) if limit > 4 => "Float64".to_string(),
                _ => "Float32".to_string(),
            },
            ColumnType::Decimal => format!(
                "Decimal({}, {})",
                options.precision.unwrap_or(10),
                options.scale.unwrap_or(0)
            ),
            ColumnType::Date => "Date".to_string(),
            ColumnType::DateTime => match options.precision {
                Some(precision) => format!("DateTime64({})", precision),
                None => "DateTime".to_string(),
            },
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Boolean => "Bool".to_string(),
            ColumnType::Enum(variants) => {
                let bits = if variants.iter().all(|(_, v)| i8::try_from(*v).is_ok()) {
                    8
                } else {
                    16
                };
                ClickhouseType::Enum {
                    bits,
                    variants: variants.clone(),
                }
                .to_string()
            }
            ColumnType::Tuple(fields) => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{} {}", name, ty))
                    .collect();
                format!("Tuple({})", fields.join(", "))
            }
            ColumnType::Custom(sql) => sql.clone(),
        }
    }
}

/// Map wrapper variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// `Map(String, T)`
    Plain,
    /// `Map(String, Array(T))`
    Array,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    /// Nullable unless explicitly `Some(false)`
    pub null: Option<bool>,
    pub low_cardinality: bool,
    pub array: bool,
    pub map: Option<MapMode>,
    pub fixed_string: Option<usize>,
    /// Positional parameters appended to the base type: `Type(value)`
    pub value: Option<String>,
    pub codec: Option<String>,
    pub ttl: Option<String>,
    pub comment: Option<String>,
    pub limit: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub unsigned: Option<bool>,
    /// Position for `ADD COLUMN`
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// Literal, encoded for the column type
    Value(Value),
    /// SQL expression used verbatim, e.g. `now()`
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub options: ColumnOptions,
    pub default: Option<ColumnDefault>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            options: ColumnOptions::default(),
            default: None,
        }
    }

    /// Build from a full option set, rejecting contradictory options
    pub fn with_options(
        name: impl Into<String>,
        column_type: ColumnType,
        options: ColumnOptions,
    ) -> Result<Self, AdapterError> {
        let name = name.into();
        if options.array && options.map.is_some() {
            return Err(AdapterError::invalid(format!(
                "column {}: array and map options are mutually exclusive",
                name
            )));
        }
        Ok(Self {
            name,
            column_type,
            options,
            default: None,
        })
    }

    pub fn null(mut self, null: bool) -> Self {
        self.options.null = Some(null);
        self
    }

    pub fn low_cardinality(mut self) -> Self {
        self.options.low_cardinality = true;
        self
    }

    pub fn array(mut self) -> Result<Self, AdapterError> {
        if self.options.map.is_some() {
            return Err(AdapterError::invalid(format!(
                "column {}: array and map options are mutually exclusive",
                self.name
            )));
        }
        self.options.array = true;
        Ok(self)
    }

    pub fn map(mut self, mode: MapMode) -> Result<Self, AdapterError> {
        if self.options.array {
            return Err(AdapterError::invalid(format!(
                "column {}: array and map options are mutually exclusive",
                self.name
            )));
        }
        self.options.map = Some(mode);
        Ok(self)
    }

    pub fn fixed_string(mut self, width: usize) -> Self {
        self.options.fixed_string = Some(width);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.options.value = Some(value.into());
        self
    }

    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.options.codec = Some(codec.into());
        self
    }

    pub fn ttl(mut self, ttl: impl Into<String>) -> Self {
        self.options.ttl = Some(ttl.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn precision(mut self, precision: u8, scale: Option<u8>) -> Self {
        self.options.precision = Some(precision);
        self.options.scale = scale;
        self
    }

    pub fn signed(mut self) -> Self {
        self.options.unsigned = Some(false);
        self
    }

    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.options.after = Some(column.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_expression(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expr.into()));
        self
    }
}

/// Placement of an index added with `ALTER TABLE ... ADD INDEX`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPosition {
    First,
    After(String),
}

/// Data-skipping index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub expression: String,
    pub index_type: String,
    pub granularity: Option<u64>,
    pub if_not_exists: bool,
    pub position: Option<IndexPosition>,
}

impl IndexDefinition {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        index_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            index_type: index_type.into(),
            granularity: None,
            if_not_exists: false,
            position: None,
        }
    }

    pub fn granularity(mut self, granularity: u64) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn position(mut self, position: IndexPosition) -> Self {
        self.position = Some(position);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableKind {
    #[default]
    Table,
    View,
    MaterializedView,
}

/// Distributed companion of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedOptions {
    /// Name of the `Distributed` table
    pub table: String,
    /// Defaults to `rand()`
    pub sharding_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub order_by: Option<String>,
    pub partition_by: Option<String>,
    pub sample_by: Option<String>,
    pub ttl: Option<String>,
    pub settings: IndexMap<String, String>,
    pub indexes: Vec<IndexDefinition>,
    /// Engine clause; may carry trailing clauses such as `MergeTree ORDER BY id`
    pub engine: Option<String>,
    pub as_query: Option<String>,
    pub to: Option<String>,
    pub populate: bool,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub distributed: Option<DistributedOptions>,
    pub comment: Option<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn view(name: impl Into<String>, as_query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::View,
            as_query: Some(as_query.into()),
            ..Self::default()
        }
    }

    pub fn materialized_view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::MaterializedView,
            ..Self::default()
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by = Some(expr.into());
        self
    }

    pub fn partition_by(mut self, expr: impl Into<String>) -> Self {
        self.partition_by = Some(expr.into());
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn sample_by(mut self, expr: impl Into<String>) -> Self {
        self.sample_by = Some(expr.into());
        self
    }

    pub fn ttl(mut self, expr: impl Into<String>) -> Self {
        self.ttl = Some(expr.into());
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn as_query(mut self, query: impl Into<String>) -> Self {
        self.as_query = Some(query.into());
        self
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.to = Some(target.into());
        self
    }

    pub fn populate(mut self) -> Self {
        self.populate = true;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn distributed(mut self, table: impl Into<String>, sharding_key: Option<&str>) -> Self {
        self.distributed = Some(DistributedOptions {
            table: table.into(),
            sharding_key: sharding_key.map(str::to_string),
        });
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_view(&self) -> bool {
        self.kind != TableKind::Table
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryAttribute {
    pub name: String,
    pub type_name: String,
    pub default: Option<Value>,
    pub expression: Option<String>,
    pub hierarchical: bool,
    pub injective: bool,
}

impl DictionaryAttribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
            expression: None,
            hierarchical: false,
            injective: false,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn expression(mut self, expr: impl Into<String>) -> Self {
        self.expression = Some(expr.into());
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn injective(mut self) -> Self {
        self.injective = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryLifetime {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryDefinition {
    pub name: String,
    pub attributes: Vec<DictionaryAttribute>,
    pub primary_key: Vec<String>,
    /// Source clause body, e.g. `CLICKHOUSE(TABLE 'users')`
    pub source: String,
    /// Layout clause body, e.g. `HASHED()`
    pub layout: String,
    pub lifetime: Option<DictionaryLifetime>,
    pub or_replace: bool,
    pub if_not_exists: bool,
    pub comment: Option<String>,
}

impl DictionaryDefinition {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        layout: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            primary_key: Vec::new(),
            source: source.into(),
            layout: layout.into(),
            lifetime: None,
            or_replace: false,
            if_not_exists: false,
            comment: None,
        }
    }

    pub fn attribute(mut self, attribute: DictionaryAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn lifetime(mut self, lifetime: DictionaryLifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn or_replace(mut self) -> Self {
        self.or_replace = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}
