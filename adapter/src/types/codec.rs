//! Per-type decode (wire value -> host value) and encode (host value -> literal)
//!
//! Wire values come out of the JSON response formats. ClickHouse quotes 64-bit
//! and wider integers by default, so every numeric decoder accepts both JSON
//! numbers and JSON strings.

use std::borrow::Cow;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use num_bigint::BigInt;
use regex::Regex;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::parse::ClickhouseType;
use super::value::{Value, decimal_literal, float_literal, plain_decimal, quote_string};
use crate::error::AdapterError;

/// Aggregate-function metadata of an `AggregateFunction`/`SimpleAggregateFunction` column
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateInfo {
    pub function: String,
    pub argument_types: Vec<ClickhouseType>,
    pub simple: bool,
}

const ZERO_DATE: &str = "0000-00-00";

fn uuid_pattern() -> &'static Regex {
    static RE_UUID: OnceLock<Regex> = OnceLock::new();
    RE_UUID.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-8][0-9a-f]{3}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("Invalid regex")
    })
}

/// Textual form of a wire value, with numbers kept at full precision
fn wire_text(wire: &JsonValue) -> Cow<'_, str> {
    match wire {
        JsonValue::String(s) => Cow::Borrowed(s.as_str()),
        JsonValue::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

fn is_zero_timestamp(text: &str) -> bool {
    text.starts_with(ZERO_DATE) && text.chars().all(|c| matches!(c, '0' | '-' | ':' | ' ' | '.'))
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // unix_timestamp output: seconds with an optional fraction
    let (secs, frac) = text.split_once('.').unwrap_or((text, ""));
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

/// Exact decimal from wire or literal text, scientific notation included
fn parse_decimal(text: &str) -> Option<BigDecimal> {
    let text = text.trim().trim_end_matches('.');
    BigDecimal::from_str(text).ok()
}

impl ClickhouseType {
    /// Decode one wire value
    pub fn decode(&self, wire: &JsonValue) -> Result<Value, AdapterError> {
        if wire.is_null() {
            return Ok(Value::Null);
        }
        let text = wire_text(wire);
        let fail = || AdapterError::decode(self.to_string(), &text);

        match self {
            ClickhouseType::UInt(bits) if *bits <= 64 => {
                text.parse::<u64>().map(Value::UInt).map_err(|_| fail())
            }
            ClickhouseType::Int(bits) if *bits <= 64 => {
                text.parse::<i64>().map(Value::Int).map_err(|_| fail())
            }
            ClickhouseType::UInt(_) | ClickhouseType::Int(_) => {
                BigInt::from_str(&text).map(Value::BigInt).map_err(|_| fail())
            }
            ClickhouseType::Float32 | ClickhouseType::Float64 => {
                text.parse::<f64>().map(Value::Float).map_err(|_| fail())
            }
            ClickhouseType::Decimal { .. } => parse_decimal(&text).map(Value::Decimal).ok_or_else(fail),
            ClickhouseType::Bool => match wire {
                JsonValue::Bool(b) => Ok(Value::Bool(*b)),
                _ => match text.as_ref() {
                    "1" | "true" => Ok(Value::Bool(true)),
                    "0" | "false" => Ok(Value::Bool(false)),
                    _ => Err(fail()),
                },
            },
            ClickhouseType::String | ClickhouseType::Enum { .. } => {
                Ok(Value::String(text.into_owned()))
            }
            ClickhouseType::FixedString(_) => {
                Ok(Value::String(text.trim_end_matches('\0').to_string()))
            }
            ClickhouseType::Date | ClickhouseType::Date32 => {
                if text == ZERO_DATE {
                    return Ok(Value::Null);
                }
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| fail())
            }
            ClickhouseType::DateTime { .. } | ClickhouseType::DateTime64 { .. } => {
                if is_zero_timestamp(&text) {
                    return Ok(Value::Null);
                }
                parse_datetime(&text).map(Value::DateTime).ok_or_else(fail)
            }
            ClickhouseType::Uuid => {
                // Tolerant cast: anything that is not a canonical UUID becomes NULL
                if text.chars().all(|c| c == '0' || c == '-') || uuid_pattern().is_match(&text) {
                    Ok(Uuid::parse_str(&text).map(Value::Uuid).unwrap_or(Value::Null))
                } else {
                    Ok(Value::Null)
                }
            }
            ClickhouseType::Ipv4 | ClickhouseType::Ipv6 => {
                IpAddr::from_str(&text).map(Value::Ip).map_err(|_| fail())
            }
            ClickhouseType::Nullable(inner) | ClickhouseType::LowCardinality(inner) => {
                inner.decode(wire)
            }
            ClickhouseType::Array(inner) => match wire {
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| inner.decode(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(fail()),
            },
            ClickhouseType::Map(key_type, value_type) => {
                let pairs = match wire {
                    JsonValue::Object(entries) => entries
                        .iter()
                        .map(|(k, v)| {
                            Ok((
                                key_type.decode(&JsonValue::String(k.clone()))?,
                                value_type.decode(v)?,
                            ))
                        })
                        .collect::<Result<Vec<_>, AdapterError>>()?,
                    JsonValue::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            JsonValue::Array(pair) if pair.len() == 2 => {
                                Ok((key_type.decode(&pair[0])?, value_type.decode(&pair[1])?))
                            }
                            _ => Err(fail()),
                        })
                        .collect::<Result<Vec<_>, AdapterError>>()?,
                    _ => return Err(fail()),
                };
                Ok(Value::Map(pairs))
            }
            ClickhouseType::Tuple(fields) => {
                let mut record = Vec::with_capacity(fields.len());
                for (idx, field) in fields.iter().enumerate() {
                    let key = field
                        .name
                        .clone()
                        .unwrap_or_else(|| (idx + 1).to_string());
                    let item = match wire {
                        JsonValue::Array(items) if items.len() == fields.len() => &items[idx],
                        JsonValue::Object(entries) => entries.get(&key).ok_or_else(fail)?,
                        _ => return Err(fail()),
                    };
                    record.push((key, field.ty.decode(item)?));
                }
                Ok(Value::Tuple(record))
            }
            ClickhouseType::AggregateFunction { arguments, .. } => match arguments.first() {
                Some(argument) => argument.decode(wire),
                None => ClickhouseType::UInt(64).decode(wire),
            },
        }
    }

    /// Encode a host value as a literal for this column type (DDL defaults, inserts)
    pub fn encode_literal(&self, value: &Value) -> Result<String, AdapterError> {
        let mismatch = || {
            AdapterError::invalid(format!(
                "{} is not a valid {} literal",
                value.to_sql_literal(),
                self
            ))
        };

        match (self, value) {
            (ClickhouseType::Nullable(inner) | ClickhouseType::LowCardinality(inner), _) => {
                inner.encode_literal(value)
            }
            (ClickhouseType::AggregateFunction { arguments, .. }, _) => match arguments.first() {
                Some(argument) => argument.encode_literal(value),
                None => Ok(value.to_sql_literal()),
            },
            (ClickhouseType::Map(..), Value::Null) => Ok("{}".to_string()),
            (_, Value::Null) => Ok("NULL".to_string()),
            (ClickhouseType::Decimal { .. }, _) => {
                let decimal = match value {
                    Value::Decimal(d) => Some(d.clone()),
                    Value::Int(v) => Some(BigDecimal::from(*v)),
                    Value::UInt(v) => Some(BigDecimal::from(*v)),
                    Value::Float(v) if v.is_finite() => parse_decimal(&v.to_string()),
                    Value::String(s) => parse_decimal(s),
                    _ => None,
                };
                decimal.map(|d| decimal_literal(&d)).ok_or_else(mismatch)
            }
            (ClickhouseType::Float32 | ClickhouseType::Float64, _) => match value {
                Value::Float(v) => Ok(float_literal(*v)),
                Value::Int(v) => Ok(float_literal(*v as f64)),
                Value::UInt(v) => Ok(float_literal(*v as f64)),
                Value::Decimal(d) => Ok(plain_decimal(d)),
                _ => Err(mismatch()),
            },
            (ClickhouseType::UInt(_) | ClickhouseType::Int(_), _) => match value {
                Value::UInt(_) | Value::Int(_) | Value::BigInt(_) => Ok(value.to_sql_literal()),
                Value::Bool(b) => Ok(u8::from(*b).to_string()),
                Value::String(s) if BigInt::from_str(s).is_ok() => Ok(s.clone()),
                _ => Err(mismatch()),
            },
            (
                ClickhouseType::String | ClickhouseType::FixedString(_) | ClickhouseType::Enum { .. },
                _,
            ) => match value {
                Value::String(s) => Ok(quote_string(s)),
                Value::Array(_) | Value::Map(_) | Value::Tuple(_) => Err(mismatch()),
                other => Ok(quote_string(other.to_sql_literal().trim_matches('\''))),
            },
            (ClickhouseType::Array(inner), Value::Array(items)) => {
                let items = items
                    .iter()
                    .map(|item| inner.encode_literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("[{}]", items.join(", ")))
            }
            (ClickhouseType::Map(key_type, value_type), Value::Map(pairs)) => {
                let pairs = pairs
                    .iter()
                    .map(|(k, v)| {
                        Ok(format!(
                            "{}: {}",
                            key_type.encode_literal(k)?,
                            value_type.encode_literal(v)?
                        ))
                    })
                    .collect::<Result<Vec<_>, AdapterError>>()?;
                Ok(format!("{{{}}}", pairs.join(", ")))
            }
            (ClickhouseType::Tuple(fields), Value::Tuple(values)) if fields.len() == values.len() => {
                let items = fields
                    .iter()
                    .zip(values)
                    .map(|(field, (_, v))| field.ty.encode_literal(v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", items.join(", ")))
            }
            (ClickhouseType::Array(_) | ClickhouseType::Map(..) | ClickhouseType::Tuple(_), _) => {
                Err(mismatch())
            }
            (ClickhouseType::Date | ClickhouseType::Date32, Value::DateTime(dt)) => {
                Ok(format!("'{}'", dt.format("%Y-%m-%d")))
            }
            (_, Value::String(s)) => Ok(quote_string(s)),
            _ => Ok(value.to_sql_literal()),
        }
    }

    /// Aggregate-function metadata, if this is an aggregate state column
    pub fn aggregate_info(&self) -> Option<AggregateInfo> {
        match self {
            ClickhouseType::AggregateFunction {
                function,
                arguments,
                simple,
            } => Some(AggregateInfo {
                function: function.clone(),
                argument_types: arguments.clone(),
                simple: *simple,
            }),
            ClickhouseType::Nullable(inner) | ClickhouseType::LowCardinality(inner) => {
                inner.aggregate_info()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ty(s: &str) -> ClickhouseType {
        ClickhouseType::parse(s).unwrap()
    }

    #[test]
    fn test_decode_integers_from_numbers_and_strings() {
        assert_eq!(ty("UInt8").decode(&json!(200)).unwrap(), Value::UInt(200));
        assert_eq!(ty("Int32").decode(&json!(-5)).unwrap(), Value::Int(-5));
        assert_eq!(
            ty("UInt64").decode(&json!("18446744073709551615")).unwrap(),
            Value::UInt(u64::MAX)
        );
        assert_eq!(
            ty("Int64").decode(&json!("-9223372036854775808")).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn test_decode_wide_integers() {
        let big = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(
            ty("UInt256").decode(&json!(big)).unwrap(),
            Value::BigInt(BigInt::from_str(big).unwrap())
        );
    }

    #[test]
    fn test_decode_decimal_is_exact() {
        let value = ty("Decimal(38, 10)")
            .decode(&serde_json::from_str::<JsonValue>("1234567890.0123456789").unwrap())
            .unwrap();
        assert_eq!(
            value,
            Value::Decimal(BigDecimal::from_str("1234567890.0123456789").unwrap())
        );
    }

    #[test]
    fn test_decode_decimal_full_width() {
        let cases = [
            ("Decimal(38, 10)", "1234567890123456789012345678.0123456789"),
            ("Decimal128(20)", "-123456789012345678.12345678901234567891"),
            (
                "Decimal256(30)",
                "1234567890123456789012345678901234567890123456.123456789012345678901234567891",
            ),
        ];
        for (type_name, text) in cases {
            let codec = ty(type_name);
            let wire = serde_json::from_str::<JsonValue>(text).unwrap();
            for wire in [wire, json!(text)] {
                let value = codec.decode(&wire).unwrap();
                assert_eq!(value, Value::Decimal(BigDecimal::from_str(text).unwrap()));
                assert_eq!(value.to_sql_literal(), text);
                assert_eq!(codec.encode_literal(&value).unwrap(), text);
            }
        }
    }

    #[test]
    fn test_decimal256_literal_round_trip() {
        let codec = ty("Decimal(76, 38)");
        let text = "12345678901234567890123456789012345678.12345678901234567890123456789012345670";
        let literal = codec
            .encode_literal(&Value::String(text.to_string()))
            .unwrap();
        assert_eq!(
            literal,
            "12345678901234567890123456789012345678.1234567890123456789012345678901234567"
        );
        assert_eq!(
            codec.decode(&JsonValue::String(literal)).unwrap(),
            Value::Decimal(BigDecimal::from_str(text).unwrap())
        );
    }

    #[test]
    fn test_numeric_round_trip() {
        let cases = vec![
            ("UInt8", Value::UInt(255)),
            ("UInt64", Value::UInt(u64::MAX)),
            ("Int64", Value::Int(i64::MIN)),
            ("Int16", Value::Int(-300)),
            (
                "UInt128",
                Value::BigInt(BigInt::from_str("340282366920938463463374607431768211455").unwrap()),
            ),
            ("Float64", Value::Float(1.25)),
            ("Float32", Value::Float(50.0)),
            ("Decimal(10, 2)", Value::Decimal(BigDecimal::from_str("50.00").unwrap())),
            ("Decimal64(4)", Value::Decimal(BigDecimal::from_str("-12.3456").unwrap())),
        ];
        for (type_name, value) in cases {
            let codec = ty(type_name);
            let literal = codec.encode_literal(&value).unwrap();
            let decoded = codec.decode(&JsonValue::String(literal.clone())).unwrap();
            assert_eq!(decoded, value, "{} via {}", type_name, literal);
        }
    }

    #[test]
    fn test_decimal_default_literal() {
        let literal = ty("Decimal(10, 2)")
            .encode_literal(&Value::Decimal(BigDecimal::from_str("50.0").unwrap()))
            .unwrap();
        assert_eq!(literal, "50.");
    }

    #[test]
    fn test_decode_strings() {
        assert_eq!(
            ty("LowCardinality(String)").decode(&json!("héllo")).unwrap(),
            Value::String("héllo".to_string())
        );
        assert_eq!(
            ty("Enum8('a' = 1)").decode(&json!("a")).unwrap(),
            Value::String("a".to_string())
        );
        assert_eq!(
            ty("FixedString(5)").decode(&json!("ab\u{0}\u{0}\u{0}")).unwrap(),
            Value::String("ab".to_string())
        );
    }

    #[test]
    fn test_decode_zero_dates_to_null() {
        assert_eq!(ty("Date").decode(&json!("0000-00-00")).unwrap(), Value::Null);
        assert_eq!(
            ty("DateTime").decode(&json!("0000-00-00 00:00:00")).unwrap(),
            Value::Null
        );
        assert_eq!(
            ty("DateTime64(3)").decode(&json!("0000-00-00 00:00:00.000")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_datetime_as_utc() {
        let value = ty("DateTime64(6, 'UTC')")
            .decode(&json!("2024-03-01 12:30:45.123456"))
            .unwrap();
        match value {
            Value::DateTime(dt) => {
                assert_eq!(dt.timestamp(), 1709296245);
                assert_eq!(dt.timestamp_subsec_micros(), 123456);
            }
            other => panic!("expected datetime, got {:?}", other),
        }
        assert_eq!(
            ty("Date").decode(&json!("2024-03-01")).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_decode_arrays() {
        assert_eq!(ty("Array(UInt8)").decode(&json!([])).unwrap(), Value::Array(vec![]));
        assert_eq!(
            ty("Array(Array(String))").decode(&json!([["a"], []])).unwrap(),
            Value::Array(vec![
                Value::Array(vec![Value::String("a".to_string())]),
                Value::Array(vec![]),
            ])
        );
    }

    #[test]
    fn test_decode_map_preserves_order() {
        let wire: JsonValue = serde_json::from_str(r#"{"z": 1, "a": 2}"#).unwrap();
        assert_eq!(
            ty("Map(String, UInt64)").decode(&wire).unwrap(),
            Value::Map(vec![
                (Value::String("z".to_string()), Value::UInt(1)),
                (Value::String("a".to_string()), Value::UInt(2)),
            ])
        );
    }

    #[test]
    fn test_encode_map() {
        let map_type = ty("Map(String, String)");
        let value = Value::Map(vec![(Value::from("k"), Value::from("v"))]);
        assert_eq!(map_type.encode_literal(&value).unwrap(), "{'k': 'v'}");
        assert_eq!(map_type.encode_literal(&Value::Null).unwrap(), "{}");
    }

    #[test]
    fn test_decode_named_tuple() {
        let value = ty("Tuple(id UInt64, name String)")
            .decode(&json!(["7", "seven"]))
            .unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![
                ("id".to_string(), Value::UInt(7)),
                ("name".to_string(), Value::String("seven".to_string())),
            ])
        );
        let by_name = ty("Tuple(id UInt64, name String)")
            .decode(&json!({"id": 7, "name": "seven"}))
            .unwrap();
        assert_eq!(by_name, value);
    }

    #[test]
    fn test_decode_uuid_tolerant() {
        let upper = ty("UUID")
            .decode(&json!("6B29FC40-CA47-4E5E-8B6A-4A3A6C1D5D3F"))
            .unwrap();
        let lower = ty("UUID")
            .decode(&json!("6b29fc40-ca47-4e5e-8b6a-4a3a6c1d5d3f"))
            .unwrap();
        assert!(matches!(upper, Value::Uuid(_)));
        assert_eq!(upper, lower);
        assert_eq!(ty("UUID").decode(&json!("not-a-uuid")).unwrap(), Value::Null);
        assert_eq!(
            ty("UUID")
                .decode(&json!("6b29fc40-ca47-0e5e-8b6a-4a3a6c1d5d3f"))
                .unwrap(),
            Value::Null
        );
        assert_eq!(
            ty("UUID")
                .decode(&json!("00000000-0000-0000-0000-000000000000"))
                .unwrap(),
            Value::Uuid(Uuid::nil())
        );
    }

    #[test]
    fn test_decode_aggregate_uses_argument_type() {
        let codec = ty("SimpleAggregateFunction(sum, UInt64)");
        assert_eq!(codec.decode(&json!("42")).unwrap(), Value::UInt(42));
        let info = codec.aggregate_info().unwrap();
        assert_eq!(info.function, "sum");
        assert!(info.simple);
        assert_eq!(info.argument_types, vec![ClickhouseType::UInt(64)]);
    }

    #[test]
    fn test_decode_nullable_and_errors() {
        assert_eq!(ty("Nullable(Int32)").decode(&JsonValue::Null).unwrap(), Value::Null);
        let err = ty("Int32").decode(&json!("abc")).unwrap_err();
        assert!(matches!(err, AdapterError::Decode { .. }));
    }

    #[test]
    fn test_encode_string_default() {
        assert_eq!(
            ty("Nullable(String)").encode_literal(&Value::from("it's")).unwrap(),
            "'it\\'s'"
        );
        assert_eq!(
            ty("Nullable(String)").encode_literal(&Value::Null).unwrap(),
            "NULL"
        );
    }
}
