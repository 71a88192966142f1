//! Host-side values and SQL literal quoting

use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, Utc};
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use uuid::Uuid;

/// Decoded ClickHouse value
///
/// Integers up to 64 bits use native types (the full `UInt64` range fits in
/// `u64`); wider integers use `BigInt`. Decimals are exact at any precision,
/// never binary floats.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    Ip(IpAddr),
    Array(Vec<Value>),
    /// Ordered key/value pairs; duplicates are preserved as sent
    Map(Vec<(Value, Value)>),
    /// Tuple fields keyed by name, or by 1-based position for unnamed tuples
    Tuple(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Render as a ClickHouse SQL literal without type guidance
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Float(v) => float_literal(*v),
            Value::Decimal(d) => plain_decimal(d),
            Value::String(s) => quote_string(s),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Uuid(u) => format!("'{}'", u),
            Value::Ip(ip) => format!("'{}'", ip),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(Value::to_sql_literal).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_sql_literal(), v.to_sql_literal()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Value::Tuple(fields) => {
                let items: Vec<String> = fields.iter().map(|(_, v)| v.to_sql_literal()).collect();
                format!("({})", items.join(", "))
            }
        }
    }
}

/// Quote a string literal using ClickHouse backslash escaping
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

/// Float literal; integral values keep a trailing `.0` so they stay floats
pub fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        let text = if v > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{:?}", v)
    }
}

/// Positional decimal text, never in exponent form
pub fn plain_decimal(d: &BigDecimal) -> String {
    let (digits, scale) = d.as_bigint_and_exponent();
    let mut text = digits.magnitude().to_string();
    if scale <= 0 {
        text.push_str(&"0".repeat(scale.unsigned_abs() as usize));
    } else {
        let scale = scale as usize;
        if text.len() <= scale {
            text.insert_str(0, &"0".repeat(scale + 1 - text.len()));
        }
        text.insert(text.len() - scale, '.');
    }
    if digits.sign() == Sign::Minus {
        text.insert(0, '-');
    }
    text
}

/// Decimal literal with trailing zeros stripped, keeping the point: `50.00` -> `50.`
pub fn decimal_literal(d: &BigDecimal) -> String {
    let text = plain_decimal(&d.normalized());
    if text.contains('.') {
        text
    } else {
        format!("{}.", text)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("plain"), "'plain'");
        assert_eq!(quote_string("it's"), "'it\\'s'");
        assert_eq!(quote_string("back\\slash"), "'back\\\\slash'");
    }

    #[test]
    fn test_decimal_literal_strips_trailing_zeros() {
        let literal = |text: &str| decimal_literal(&BigDecimal::from_str(text).unwrap());
        assert_eq!(literal("50.0"), "50.");
        assert_eq!(literal("50"), "50.");
        assert_eq!(literal("12.50"), "12.5");
        assert_eq!(literal("0.00"), "0.");
        assert_eq!(literal("-0.0500"), "-0.05");
        assert_eq!(literal("1.2e3"), "1200.");
    }

    #[test]
    fn test_plain_decimal_never_uses_exponent() {
        let plain = |text: &str| plain_decimal(&BigDecimal::from_str(text).unwrap());
        assert_eq!(plain("1e20"), "100000000000000000000");
        assert_eq!(plain("1.5e-8"), "0.000000015");
        assert_eq!(plain("-12.3456"), "-12.3456");
        assert_eq!(
            Value::Decimal(BigDecimal::from_str("0.000001").unwrap()).to_sql_literal(),
            "0.000001"
        );
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(1.5), "1.5");
        assert_eq!(float_literal(50.0), "50.0");
        assert_eq!(float_literal(f64::INFINITY), "inf");
    }

    #[test]
    fn test_composite_literals() {
        let array = Value::Array(vec![Value::from(1i64), Value::from(2i64)]);
        assert_eq!(array.to_sql_literal(), "[1, 2]");

        let map = Value::Map(vec![(Value::from("k"), Value::from("v"))]);
        assert_eq!(map.to_sql_literal(), "{'k': 'v'}");

        let tuple = Value::Tuple(vec![
            ("1".to_string(), Value::from("a")),
            ("2".to_string(), Value::Null),
        ]);
        assert_eq!(tuple.to_sql_literal(), "('a', NULL)");
    }

    #[test]
    fn test_datetime_literal() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
            .and_utc();
        assert_eq!(Value::from(dt).to_sql_literal(), "'2024-01-02 03:04:05'");
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
    }
}
