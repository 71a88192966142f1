//! HTTP response decoding
//!
//! A response is first decompressed (by magic-byte sniffing), then checked for
//! server failures, then parsed according to the format that was requested.
//! Formats without a structured parser, and bodies that do not parse, come
//! back as raw text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::compression;
use crate::constants::EXCEPTION_MARKER;
use crate::error::AdapterError;
use crate::types::{TypeRegistry, Value};

/// Raw HTTP response as handed back by a transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// `Content-Encoding` response header, if any
    pub content_encoding: Option<String>,
}

impl WireResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_encoding: None,
        }
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            content_encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }
}

/// What was asked of the server, kept for decoding and diagnostics
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub sql: String,
    /// Output format appended to the statement, if any
    pub format: Option<String>,
}

impl RequestContext {
    pub fn new(sql: impl Into<String>, format: Option<&str>) -> Self {
        Self {
            sql: sql.into(),
            format: format.map(str::to_string),
        }
    }
}

/// Column name and declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Query statistics reported by the JSON formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub elapsed: f64,
    #[serde(default)]
    pub rows_read: u64,
    #[serde(default)]
    pub bytes_read: u64,
}

/// Tabular result with rows kept as wire values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<JsonValue>>,
    pub statistics: Option<Statistics>,
}

impl DecodedResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Decode every cell through the type system
    pub fn typed_rows(&self, registry: &TypeRegistry) -> Result<Vec<Vec<Value>>, AdapterError> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| registry.decode(&column.type_name, cell))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Rows keyed by column name, in column order
    pub fn records(&self) -> Vec<IndexMap<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.name.clone(), cell.clone()))
                    .collect::<IndexMap<_, _>>()
            })
            .collect()
    }

    /// First cell of the first row
    pub fn scalar(&self) -> Option<&JsonValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Outcome of decoding a successful response
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Tabular(DecodedResult),
    Raw(String),
}

impl Decoded {
    pub fn into_tabular(self) -> Option<DecodedResult> {
        match self {
            Decoded::Tabular(result) => Some(result),
            Decoded::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Decoded::Raw(text) => Some(text),
            Decoded::Tabular(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct CompactDocument {
    meta: Vec<ColumnMeta>,
    data: Vec<Vec<JsonValue>>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

/// Decompress the body if the payload is actually compressed
pub fn decompress_body(response: &WireResponse) -> Vec<u8> {
    match &response.content_encoding {
        Some(encoding) => compression::decompress(&response.body, encoding).into_owned(),
        None => response.body.clone(),
    }
}

/// Map a failed response onto the error taxonomy
pub fn classify_failure(status: u16, body: &str, sql: &str) -> AdapterError {
    let message = body.trim().to_string();
    if status != 200 {
        if body.contains("UNKNOWN_DATABASE") || body.contains("Code: 81.") {
            return AdapterError::NoDatabase {
                message,
                sql: sql.to_string(),
            };
        }
        if body.contains("DATABASE_ALREADY_EXISTS") || body.contains("Code: 82.") {
            return AdapterError::DatabaseAlreadyExists {
                message,
                sql: sql.to_string(),
            };
        }
    }
    AdapterError::database(status, message, sql)
}

/// Check status and body for failures, returning the decompressed text
pub fn checked_body(response: &WireResponse, ctx: &RequestContext) -> Result<String, AdapterError> {
    let body = decompress_body(response);
    let text = String::from_utf8_lossy(&body).into_owned();
    if response.status != 200 || text.contains(EXCEPTION_MARKER) {
        tracing::debug!(status = response.status, sql = %ctx.sql, "ClickHouse returned an error");
        return Err(classify_failure(response.status, &text, &ctx.sql));
    }
    Ok(text)
}

/// Decode a response for the requested format
pub fn decode(response: &WireResponse, ctx: &RequestContext) -> Result<Decoded, AdapterError> {
    let text = checked_body(response, ctx)?;
    Ok(parse_body(text, ctx.format.as_deref()))
}

/// Parse an already-checked body; never fails
pub fn parse_body(text: String, format: Option<&str>) -> Decoded {
    if text.trim().is_empty() {
        return Decoded::Raw(text);
    }
    let Some(format) = format else {
        return Decoded::Raw(text);
    };

    let parsed = if format.ends_with("EachRowWithNamesAndTypes") {
        parse_names_and_types(&text)
    } else if format.starts_with("JSONCompact") && !format.contains("EachRow") {
        serde_json::from_str::<CompactDocument>(&text)
            .map(|doc| DecodedResult {
                columns: doc.meta,
                rows: doc.data,
                statistics: doc.statistics,
            })
            .map_err(|e| e.to_string())
    } else {
        return Decoded::Raw(text);
    };

    match parsed {
        Ok(result) => Decoded::Tabular(result),
        Err(e) => {
            tracing::debug!(format = %format, error = %e, "Response did not parse, returning raw body");
            Decoded::Raw(text)
        }
    }
}

/// Reassemble `names\ntypes\nrow...` NDJSON into a tabular result
fn parse_names_and_types(text: &str) -> Result<DecodedResult, String> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let mut next_strings = |what: &str| -> Result<Vec<String>, String> {
        let line = lines.next().ok_or_else(|| format!("missing {} line", what))?;
        serde_json::from_str::<Vec<String>>(line).map_err(|e| e.to_string())
    };
    let names = next_strings("names")?;
    let types = next_strings("types")?;
    if names.len() != types.len() {
        return Err(format!(
            "{} column names but {} types",
            names.len(),
            types.len()
        ));
    }

    let rows = lines
        .map(|line| serde_json::from_str::<Vec<JsonValue>>(line).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedResult {
        columns: names.into_iter().zip(types).map(|(n, t)| ColumnMeta::new(n, t)).collect(),
        rows,
        statistics: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(format: &str) -> RequestContext {
        RequestContext::new("SELECT 1", Some(format))
    }

    #[test]
    fn test_decode_json_compact() {
        let response = WireResponse::ok(r#"{"meta":[{"name":"1","type":"UInt8"}],"data":[[1]],"rows":1}"#);
        let result = decode(&response, &ctx("JSONCompact"))
            .unwrap()
            .into_tabular()
            .unwrap();
        assert_eq!(result.columns, vec![ColumnMeta::new("1", "UInt8")]);
        assert_eq!(result.rows, vec![vec![json!(1)]]);
        assert!(result.statistics.is_none());
    }

    #[test]
    fn test_decode_json_compact_statistics() {
        let body = r#"{"meta":[{"name":"n","type":"UInt64"}],"data":[["18446744073709551615"]],"rows":1,"statistics":{"elapsed":0.001,"rows_read":1,"bytes_read":8}}"#;
        let result = decode(&WireResponse::ok(body), &ctx("JSONCompact"))
            .unwrap()
            .into_tabular()
            .unwrap();
        assert_eq!(result.statistics.as_ref().unwrap().rows_read, 1);
        let typed = result.typed_rows(TypeRegistry::global()).unwrap();
        assert_eq!(typed, vec![vec![Value::UInt(u64::MAX)]]);
    }

    #[test]
    fn test_decode_preserves_decimal_precision() {
        let body = r#"{"meta":[{"name":"d","type":"Decimal(38, 18)"}],"data":[[12345678901234567.123456789012345678]]}"#;
        let result = decode(&WireResponse::ok(body), &ctx("JSONCompact"))
            .unwrap()
            .into_tabular()
            .unwrap();
        assert_eq!(
            result.rows[0][0].to_string(),
            "12345678901234567.123456789012345678"
        );
    }

    #[test]
    fn test_typed_rows_keep_wide_decimals() {
        let body = r#"{"meta":[{"name":"d","type":"Decimal(38, 10)"}],"data":[[1234567890123456789012345678.0123456789]]}"#;
        let result = decode(&WireResponse::ok(body), &ctx("JSONCompact"))
            .unwrap()
            .into_tabular()
            .unwrap();
        let typed = result.typed_rows(TypeRegistry::global()).unwrap();
        assert_eq!(
            typed[0][0].to_sql_literal(),
            "1234567890123456789012345678.0123456789"
        );
    }

    #[test]
    fn test_decode_names_and_types() {
        let body = "[\"id\",\"name\"]\n[\"UInt64\",\"String\"]\n[1,\"test\"]\n";
        let result = decode(
            &WireResponse::ok(body),
            &ctx("JSONCompactEachRowWithNamesAndTypes"),
        )
        .unwrap()
        .into_tabular()
        .unwrap();
        assert_eq!(
            result.columns,
            vec![ColumnMeta::new("id", "UInt64"), ColumnMeta::new("name", "String")]
        );
        assert_eq!(result.rows, vec![vec![json!(1), json!("test")]]);
        assert_eq!(result.records()[0]["name"], json!("test"));
    }

    #[test]
    fn test_decode_empty_body_is_raw() {
        let decoded = decode(&WireResponse::ok(""), &ctx("JSONCompact")).unwrap();
        assert_eq!(decoded, Decoded::Raw(String::new()));
    }

    #[test]
    fn test_unparsable_json_falls_back_to_raw() {
        let decoded = decode(&WireResponse::ok("1\tone\n"), &ctx("JSONCompact")).unwrap();
        assert_eq!(decoded.as_raw(), Some("1\tone\n"));
    }

    #[test]
    fn test_passthrough_formats() {
        let body = "{\"a\":1}\n{\"a\":2}\n";
        let decoded = decode(&WireResponse::ok(body), &ctx("JSONEachRow")).unwrap();
        assert_eq!(decoded.as_raw(), Some(body));
        let decoded = decode(&WireResponse::ok("a\n1\n"), &ctx("CSVWithNames")).unwrap();
        assert_eq!(decoded.as_raw(), Some("a\n1\n"));
    }

    #[test]
    fn test_exception_in_success_body() {
        let body = "Code: 241. DB::Exception: Memory limit exceeded";
        let err = decode(&WireResponse::ok(body), &ctx("JSONCompact")).unwrap_err();
        match err {
            AdapterError::Database { status, message, sql } => {
                assert_eq!(status, 200);
                assert!(message.contains("Memory limit"));
                assert_eq!(sql, "SELECT 1");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_failure_classification() {
        let err = decode(
            &WireResponse::with_status(404, "Code: 81. DB::Exception: Database nope does not exist. (UNKNOWN_DATABASE)"),
            &ctx("JSONCompact"),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::NoDatabase { .. }));

        let err = decode(
            &WireResponse::with_status(500, "Code: 82. DB::Exception: Database db already exists. (DATABASE_ALREADY_EXISTS)"),
            &ctx("JSONCompact"),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::DatabaseAlreadyExists { .. }));

        let err = decode(
            &WireResponse::with_status(500, "Code: 62. DB::Exception: Syntax error"),
            &ctx("JSONCompact"),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Database { status: 500, .. }));
        assert!(err.to_string().contains("SELECT 1"));
    }

    #[test]
    fn test_gzip_body_is_decompressed() {
        let body = r#"{"meta":[{"name":"x","type":"String"}],"data":[["a"]]}"#;
        let packed = compression::compress(body.as_bytes(), "gzip").into_owned();
        let response = WireResponse::ok(packed).with_encoding("gzip");
        let result = decode(&response, &ctx("JSONCompact"))
            .unwrap()
            .into_tabular()
            .unwrap();
        assert_eq!(result.scalar(), Some(&json!("a")));

        // already inflated by the transport
        let response = WireResponse::ok(body).with_encoding("gzip");
        assert!(matches!(
            decode(&response, &ctx("JSONCompact")).unwrap(),
            Decoded::Tabular(_)
        ));
    }
}
