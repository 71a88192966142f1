//! Row streaming through a temporary spool file
//!
//! Large results are written to disk by the transport and read back one
//! line at a time, so only a single row is held in memory. Compressed
//! bodies are the exception: they are decompressed in memory first.

use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};

use serde_json::Value as JsonValue;

use super::{ClickhouseAdapter, QueryOptions, Transport};
use crate::compression;
use crate::constants::EXCEPTION_MARKER;
use crate::error::AdapterError;
use crate::format;
use crate::response::{ColumnMeta, classify_failure};

/// Format used for streamed results
pub const STREAM_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

fn parse_line<V: serde::de::DeserializeOwned>(line: &str, sql: &str) -> Result<V, AdapterError> {
    if line.contains(EXCEPTION_MARKER) {
        return Err(classify_failure(200, line, sql));
    }
    serde_json::from_str(line).map_err(|e| AdapterError::decode(STREAM_FORMAT, e))
}

impl<T: Transport> ClickhouseAdapter<T> {
    /// Stream rows of `sql` to `on_row`, returning the column metadata
    ///
    /// The spool file is removed on every exit path, including errors
    /// returned by `on_row`.
    pub fn stream_rows<F>(&self, sql: &str, mut on_row: F) -> Result<Vec<ColumnMeta>, AdapterError>
    where
        F: FnMut(Vec<JsonValue>) -> Result<(), AdapterError>,
    {
        let statement = format::apply_format(sql, STREAM_FORMAT);
        let path = self.request_path(&QueryOptions::default());
        let headers = self.headers(None);

        let mut spool = tempfile::tempfile()?;
        let response =
            self.transport()
                .post_to_writer(&path, statement.as_bytes(), &headers, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;

        if response.status != 200 {
            let mut body = Vec::new();
            spool.read_to_end(&mut body)?;
            if let Some(encoding) = &response.content_encoding {
                body = compression::decompress(&body, encoding).into_owned();
            }
            return Err(classify_failure(
                response.status,
                &String::from_utf8_lossy(&body),
                &statement,
            ));
        }

        let reader: Box<dyn BufRead> = match &response.content_encoding {
            Some(encoding) => {
                let mut body = Vec::new();
                spool.read_to_end(&mut body)?;
                let plain = compression::decompress(&body, encoding).into_owned();
                Box::new(Cursor::new(plain))
            }
            None => Box::new(BufReader::new(spool)),
        };

        let mut lines = reader.lines();
        let mut next_line = || -> Result<Option<String>, AdapterError> {
            for line in lines.by_ref() {
                let line = line?;
                if !line.trim().is_empty() {
                    return Ok(Some(line));
                }
            }
            Ok(None)
        };

        let Some(names_line) = next_line()? else {
            return Ok(Vec::new());
        };
        let names: Vec<String> = parse_line(&names_line, &statement)?;
        let types_line = next_line()?
            .ok_or_else(|| AdapterError::decode(STREAM_FORMAT, "missing types line"))?;
        let types: Vec<String> = parse_line(&types_line, &statement)?;
        if names.len() != types.len() {
            return Err(AdapterError::decode(
                STREAM_FORMAT,
                format!("{} column names but {} types", names.len(), types.len()),
            ));
        }

        let mut count = 0u64;
        while let Some(line) = next_line()? {
            on_row(parse_line(&line, &statement)?)?;
            count += 1;
        }
        tracing::debug!(rows = count, sql = %statement, "Streamed rows");

        Ok(names
            .into_iter()
            .zip(types)
            .map(|(name, type_name)| ColumnMeta::new(name, type_name))
            .collect())
    }
}
