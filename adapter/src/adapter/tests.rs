use std::sync::{Arc, mpsc};

use parking_lot::Mutex;
use semver::Version;
use serde_json::json;

use super::*;
use crate::error::TransportError;
use crate::response::ColumnMeta;
use crate::schema::{ColumnDefinition, ColumnType};
use crate::sql::{DeleteStatement, Expr, UpdateStatement};

// =========================================================================
// Mock transport
// =========================================================================

#[derive(Debug, Clone)]
struct Request {
    path: String,
    body: Vec<u8>,
    headers: Headers,
}

impl Request {
    fn sql(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

type Responder = Box<dyn Fn(&str) -> Result<WireResponse, TransportError> + Send + Sync>;

/// Records every request and answers through `responder` (given the SQL)
struct MockTransport {
    requests: Arc<Mutex<Vec<Request>>>,
    responder: Responder,
}

impl MockTransport {
    fn new(
        responder: impl Fn(&str) -> Result<WireResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Box::new(responder),
        }
    }

    fn empty() -> Self {
        Self::new(|_| Ok(WireResponse::ok("")))
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

impl Transport for MockTransport {
    fn post(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<WireResponse, TransportError> {
        self.requests.lock().push(Request {
            path: path.to_string(),
            body: body.to_vec(),
            headers: headers.to_vec(),
        });
        let plain = match headers.iter().find(|(key, _)| key == "Content-Encoding") {
            Some((_, encoding)) => compression::decompress(body, encoding).into_owned(),
            None => body.to_vec(),
        };
        (self.responder)(&String::from_utf8_lossy(&plain))
    }

    fn get(&self, path: &str) -> Result<WireResponse, TransportError> {
        match path {
            "/ping" => Ok(WireResponse::ok("Ok.\n")),
            _ => Ok(WireResponse::with_status(404, "Not found")),
        }
    }
}

fn compact(meta: &[(&str, &str)], rows: serde_json::Value) -> WireResponse {
    let meta: Vec<_> = meta
        .iter()
        .map(|(name, type_name)| json!({"name": name, "type": type_name}))
        .collect();
    WireResponse::ok(json!({"meta": meta, "data": rows, "rows": 0}).to_string())
}

fn version_responder(version: &'static str) -> impl Fn(&str) -> Result<WireResponse, TransportError> {
    move |sql| {
        if sql.starts_with("SELECT version()") {
            Ok(compact(&[("version()", "String")], json!([[version]])))
        } else {
            Ok(WireResponse::ok(""))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn adapter(transport: MockTransport) -> ClickhouseAdapter<MockTransport> {
    init_tracing();
    ClickhouseAdapter::new(transport, ConnectionConfig::new("db")).unwrap()
}

// =========================================================================
// Construction and execution
// =========================================================================

#[test]
fn test_new_rejects_invalid_config() {
    let result = ClickhouseAdapter::new(MockTransport::empty(), ConnectionConfig::new(""));
    assert!(matches!(result, Err(AdapterError::InvalidArgument(_))));

    let mut config = ConnectionConfig::new("db");
    config.compression = Some("brotli".to_string());
    let result = ClickhouseAdapter::new(MockTransport::empty(), config);
    assert!(matches!(result, Err(AdapterError::InvalidArgument(_))));
}

#[test]
fn test_select_gets_format_and_decodes() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(compact(&[("id", "UInt64"), ("name", "String")], json!([["1", "a"], ["2", "b"]])))
    }));

    let result = adapter.query("SELECT id, name FROM t;").unwrap();
    assert_eq!(result.column_names(), vec!["id", "name"]);
    assert_eq!(result.rows.len(), 2);
    let typed = result.typed_rows(adapter.registry()).unwrap();
    assert_eq!(typed[1][0], crate::types::Value::UInt(2));

    let requests = adapter.transport().requests();
    assert_eq!(requests[0].sql(), "SELECT id, name FROM t FORMAT JSONCompact");
    assert_eq!(requests[0].path, "/?database=db");
}

#[test]
fn test_ddl_sent_verbatim() {
    let adapter = adapter(MockTransport::empty());
    adapter
        .execute_ddl("  CREATE TABLE t (x UInt8) ENGINE = Memory  ")
        .unwrap();
    assert_eq!(
        adapter.transport().requests()[0].sql(),
        "CREATE TABLE t (x UInt8) ENGINE = Memory"
    );

    let result = adapter.query("INSERT INTO t VALUES (1)").unwrap();
    assert!(result.rows.is_empty());
}

#[test]
fn test_explicit_format_left_alone() {
    let adapter = adapter(MockTransport::new(|_| Ok(WireResponse::ok("1\t2\n"))));
    let decoded = adapter.execute("SELECT 1, 2 FORMAT TabSeparated").unwrap();
    assert_eq!(decoded.as_raw(), Some("1\t2\n"));
    assert_eq!(
        adapter.transport().requests()[0].sql(),
        "SELECT 1, 2 FORMAT TabSeparated"
    );

    // A tabular result was required but the body is free text
    let err = adapter.query("SELECT 1, 2 FORMAT TabSeparated").unwrap_err();
    assert!(matches!(err, AdapterError::Decode { .. }));
}

#[test]
fn test_per_call_format() {
    let adapter = adapter(MockTransport::new(|_| Ok(WireResponse::ok("a,b\n"))));
    let options = QueryOptions::default().format("CSVWithNames");
    let decoded = adapter.execute_with("SELECT 'a', 'b'", &options).unwrap();
    assert_eq!(decoded.as_raw(), Some("a,b\n"));
    assert_eq!(
        adapter.transport().requests()[0].sql(),
        "SELECT 'a', 'b' FORMAT CSVWithNames"
    );
}

#[test]
fn test_scoped_response_format() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::ok("[\"n\"]\n[\"UInt8\"]\n[1]\n[2]\n"))
    }));
    let result = adapter
        .with_response_format("JSONCompactEachRowWithNamesAndTypes", |a| {
            a.query("SELECT number AS n FROM numbers(2)")
        })
        .unwrap();
    assert_eq!(result.columns, vec![ColumnMeta::new("n", "UInt8")]);
    assert_eq!(result.rows, vec![vec![json!(1)], vec![json!(2)]]);
    assert!(
        adapter.transport().requests()[0]
            .sql()
            .ends_with("FORMAT JSONCompactEachRowWithNamesAndTypes")
    );

    adapter.execute("SELECT 1").unwrap();
    assert!(adapter.transport().requests()[1].sql().ends_with("FORMAT JSONCompact"));
}

// =========================================================================
// Settings
// =========================================================================

#[test]
fn test_settings_precedence_and_exclusion() {
    let mut config = ConnectionConfig::new("db");
    config.settings.insert("max_threads".to_string(), "1".to_string());
    config.settings.insert("readonly".to_string(), "1".to_string());
    let adapter = ClickhouseAdapter::new(MockTransport::empty(), config).unwrap();

    adapter.with_settings([("max_threads", 4)], |a| {
        let options = QueryOptions::default()
            .setting("log_comment", "nightly job")
            .exclude("readonly");
        a.execute_with("SELECT 1", &options).unwrap();
    });
    adapter.execute("SELECT 1").unwrap();

    let requests = adapter.transport().requests();
    assert_eq!(
        requests[0].path,
        "/?database=db&max_threads=4&log_comment=nightly+job"
    );
    assert_eq!(requests[1].path, "/?database=db&max_threads=1&readonly=1");
}

#[test]
fn test_scope_popped_after_error() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::with_status(500, "Code: 62. DB::Exception: Syntax error"))
    }));
    let result = adapter.with_settings([("max_execution_time", 5)], |a| a.execute("SELEC 1"));
    assert!(result.is_err());
    assert_eq!(adapter.scopes.depth(), 0);
    assert_eq!(adapter.request_path(&QueryOptions::default()), "/?database=db");
}

#[test]
fn test_nested_scope_guards() {
    let adapter = adapter(MockTransport::empty());
    let _outer = adapter.scope(ScopeFrame::settings([("max_threads", 2)]));
    {
        let _inner = adapter.scope(ScopeFrame::settings([("max_threads", 8), ("readonly", 1)]));
        assert_eq!(
            adapter.request_path(&QueryOptions::default()),
            "/?database=db&max_threads=8&readonly=1"
        );
    }
    assert_eq!(
        adapter.request_path(&QueryOptions::default()),
        "/?database=db&max_threads=2"
    );
}

#[test]
fn test_outer_scope_ended_first_keeps_inner_settings() {
    let adapter = adapter(MockTransport::empty());
    let outer = adapter.scope(ScopeFrame::settings([("max_threads", 2)]));
    let inner = adapter.scope(ScopeFrame::settings([("readonly", 1)]));
    drop(outer);
    assert_eq!(
        adapter.request_path(&QueryOptions::default()),
        "/?database=db&readonly=1"
    );
    drop(inner);
    assert_eq!(adapter.request_path(&QueryOptions::default()), "/?database=db");
}

#[test]
fn test_scoped_settings_stay_on_their_thread() {
    let adapter = adapter(MockTransport::empty());
    let adapter = &adapter;
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    std::thread::scope(|s| {
        s.spawn(move || {
            adapter.with_settings([("max_threads", 1)], |a| {
                let path = a.request_path(&QueryOptions::default());
                entered_tx.send(path).unwrap();
                release_rx.recv().unwrap();
            });
        });

        let scoped_path = entered_rx.recv().unwrap();
        assert_eq!(scoped_path, "/?database=db&max_threads=1");
        assert_eq!(adapter.request_path(&QueryOptions::default()), "/?database=db");
        adapter.execute("SELECT 1").unwrap();
        release_tx.send(()).unwrap();
    });

    let requests = adapter.transport().requests();
    assert_eq!(requests[0].path, "/?database=db");
}

// =========================================================================
// Headers and compression
// =========================================================================

#[test]
fn test_auth_and_compression_headers() {
    let mut config = ConnectionConfig::new("db");
    config.username = Some("reader".to_string());
    config.password = Some("secret".to_string());
    config.compression = Some("gzip".to_string());
    let adapter = ClickhouseAdapter::new(MockTransport::empty(), config).unwrap();

    adapter.execute("SELECT 1").unwrap();
    let long = format!("SELECT '{}'", "x".repeat(2048));
    adapter.execute(&long).unwrap();

    let requests = adapter.transport().requests();
    assert_eq!(requests[0].header(HEADER_USER), Some("reader"));
    assert_eq!(requests[0].header(HEADER_KEY), Some("secret"));
    assert!(requests[0].header("Accept-Encoding").unwrap().contains("gzip"));
    assert_eq!(requests[0].header("Content-Encoding"), None);
    assert_eq!(requests[0].path, "/?database=db&enable_http_compression=1");
    assert_eq!(requests[0].sql(), "SELECT 1 FORMAT JSONCompact");

    assert_eq!(requests[1].header("Content-Encoding"), Some("gzip"));
    assert_eq!(&requests[1].body[..2], &[0x1f, 0x8b]);
}

#[test]
fn test_compressed_response_decoded() {
    let mut config = ConnectionConfig::new("db");
    config.compression = Some("gzip".to_string());
    let transport = MockTransport::new(|_| {
        let plain = compact(&[("x", "UInt8")], json!([[7]]));
        let packed = compression::compress(&plain.body, "gzip").into_owned();
        Ok(WireResponse::ok(packed).with_encoding("gzip"))
    });
    let adapter = ClickhouseAdapter::new(transport, config).unwrap();
    assert_eq!(adapter.select_value("SELECT 7 AS x").unwrap(), Some(json!(7)));
}

// =========================================================================
// Failures
// =========================================================================

#[test]
fn test_unknown_database_classified() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::with_status(
            404,
            "Code: 81. DB::Exception: Database db doesn't exist. (UNKNOWN_DATABASE)",
        ))
    }));
    let err = adapter.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, AdapterError::NoDatabase { .. }));
    assert!(err.is_server_error());
}

#[test]
fn test_exception_in_ok_body() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::ok(
            "Code: 395. DB::Exception: Value passed to 'throwIf' function is non-zero",
        ))
    }));
    let err = adapter.execute("SELECT throwIf(1)").unwrap_err();
    assert!(matches!(err, AdapterError::Database { status: 200, .. }));
}

#[test]
fn test_transport_error_propagates() {
    let adapter = adapter(MockTransport::new(|_| {
        Err(TransportError::Timeout { timeout_secs: 60 })
    }));
    let err = adapter.execute("SELECT sleep(3)").unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Transport(TransportError::Timeout { timeout_secs: 60 })
    ));
}

// =========================================================================
// Server version gating
// =========================================================================

#[test]
fn test_parse_server_version() {
    assert_eq!(parse_server_version("23.8.2.7").unwrap(), Version::new(23, 8, 2));
    assert_eq!(parse_server_version("22.8").unwrap(), Version::new(22, 8, 0));
    assert!(parse_server_version("").is_err());
    assert!(parse_server_version("latest").is_err());
}

#[test]
fn test_server_version_cached() {
    let adapter = adapter(MockTransport::new(version_responder("23.8.2.7")));
    assert_eq!(adapter.server_version().unwrap(), Version::new(23, 8, 2));
    assert!(adapter.supports(MIN_VERSION_LIGHTWEIGHT_DELETE).unwrap());
    assert_eq!(adapter.transport().requests().len(), 1);
}

#[test]
fn test_mutations_gated_by_version() {
    let update: Statement = UpdateStatement::new("events")
        .set("status", "done")
        .unwrap()
        .filter(Expr::col("id").equals(5i64))
        .into();
    let delete: Statement = DeleteStatement::new("events")
        .filter(Expr::col("id").equals(5i64))
        .into();

    let old = adapter(MockTransport::new(version_responder("18.10.3")));
    assert!(matches!(
        old.render(&update),
        Err(AdapterError::UnsupportedOperation(_))
    ));

    let mid = adapter(MockTransport::new(version_responder("21.3.1")));
    assert_eq!(
        mid.render(&update).unwrap(),
        "ALTER TABLE events UPDATE status = 'done' WHERE id = 5"
    );
    assert!(matches!(
        mid.render(&delete),
        Err(AdapterError::UnsupportedOperation(_))
    ));

    let new = adapter(MockTransport::new(version_responder("23.8.1.1")));
    new.execute_statement(&delete).unwrap();
    let requests = new.transport().requests();
    assert_eq!(requests.last().unwrap().sql(), "DELETE FROM events WHERE id = 5");
}

// =========================================================================
// Schema
// =========================================================================

#[test]
fn test_create_table_with_companion() {
    let mut config = ConnectionConfig::new("db");
    config.cluster = Some("main".to_string());
    let adapter = ClickhouseAdapter::new(MockTransport::empty(), config).unwrap();

    let def = TableDefinition::new("events")
        .column(ColumnDefinition::new("id", ColumnType::BigInteger).null(false))
        .engine("MergeTree")
        .order_by("id")
        .distributed("events_distributed", None);
    adapter.create_table(&def).unwrap();

    let requests = adapter.transport().requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].sql().starts_with("CREATE TABLE events ON CLUSTER main"));
    assert!(
        requests[1]
            .sql()
            .starts_with("CREATE TABLE events_distributed ON CLUSTER main AS db.events")
    );

    adapter.drop_table(&def, DropOptions::table().if_exists()).unwrap();
    let requests = adapter.transport().requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[2].sql().contains("events_distributed"));
}

#[test]
fn test_database_ddl_skips_database_param() {
    let adapter = adapter(MockTransport::empty());
    adapter.create_database("analytics", true).unwrap();
    adapter.drop_database("analytics", true).unwrap();

    let requests = adapter.transport().requests();
    assert_eq!(requests[0].path, "/");
    assert_eq!(requests[0].sql(), "CREATE DATABASE IF NOT EXISTS analytics");
    assert_eq!(requests[1].path, "/");
}

#[test]
fn test_materialized_view_target_columns_from_server() {
    let adapter = adapter(MockTransport::new(|sql| {
        if sql.starts_with("DESCRIBE TABLE") {
            Ok(compact(
                &[("name", "String"), ("type", "String")],
                json!([["day", "Date"], ["hits", "UInt64"]]),
            ))
        } else {
            Ok(WireResponse::ok(""))
        }
    }));
    let def = TableDefinition::materialized_view("daily_mv")
        .to("daily")
        .as_query("SELECT toDate(ts) AS day, count() AS hits FROM events GROUP BY day");
    adapter.create_table(&def).unwrap();

    let requests = adapter.transport().requests();
    assert!(requests[0].sql().starts_with("DESCRIBE TABLE `daily`"));
    assert_eq!(
        requests[1].sql(),
        "CREATE MATERIALIZED VIEW daily_mv TO db.daily (`day` Date, `hits` UInt64) AS SELECT toDate(ts) AS day, count() AS hits FROM db.events GROUP BY day"
    );
}

// =========================================================================
// Introspection
// =========================================================================

#[test]
fn test_tables_and_views() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(compact(&[("name", "String")], json!([["events"], ["users"]])))
    }));
    assert_eq!(adapter.tables().unwrap(), vec!["events", "users"]);
    adapter.views().unwrap();

    let requests = adapter.transport().requests();
    let tables_sql = requests[0].sql();
    assert!(tables_sql.starts_with("SELECT name FROM system.tables WHERE"));
    assert!(tables_sql.contains("currentDatabase()"));
    assert!(tables_sql.contains("NOT IN ('View', 'MaterializedView')"));
    assert!(requests[1].sql().contains("engine IN ('View', 'MaterializedView')"));
}

#[test]
fn test_table_exists() {
    let adapter = adapter(MockTransport::new(|sql| {
        let count = if sql.contains("'events'") { "1" } else { "0" };
        Ok(compact(&[("count()", "UInt64")], json!([[count]])))
    }));
    assert!(adapter.table_exists("events").unwrap());
    assert!(!adapter.table_exists("missing").unwrap());
}

#[test]
fn test_columns_and_indexes() {
    let adapter = adapter(MockTransport::new(|sql| {
        if sql.starts_with("DESCRIBE") {
            Ok(compact(
                &[("name", "String"), ("type", "String"), ("default_type", "String")],
                json!([["id", "UInt64", ""], ["tags", "Array(String)", ""]]),
            ))
        } else {
            Ok(compact(
                &[
                    ("name", "String"),
                    ("expr", "String"),
                    ("type_full", "String"),
                    ("granularity", "UInt64"),
                ],
                json!([["idx_name", "name", "bloom_filter(0.01)", "4"]]),
            ))
        }
    }));

    assert_eq!(
        adapter.columns("events").unwrap(),
        vec![
            ColumnMeta::new("id", "UInt64"),
            ColumnMeta::new("tags", "Array(String)")
        ]
    );
    assert_eq!(
        adapter.indexes("events").unwrap(),
        vec![IndexInfo {
            name: "idx_name".to_string(),
            expression: "name".to_string(),
            index_type: "bloom_filter(0.01)".to_string(),
            granularity: 4,
        }]
    );
    assert!(
        adapter.transport().requests()[1]
            .sql()
            .contains("FROM system.data_skipping_indices")
    );
}

#[test]
fn test_ping() {
    let adapter = adapter(MockTransport::empty());
    assert!(adapter.ping().unwrap());
}

// =========================================================================
// Migrations
// =========================================================================

#[test]
fn test_migration_versions_round() {
    let adapter = adapter(MockTransport::new(|sql| {
        if sql.starts_with("SELECT version FROM") {
            Ok(compact(&[("version", "String")], json!([["20240101"], ["20240215"]])))
        } else {
            Ok(WireResponse::ok(""))
        }
    }));
    let migrations = adapter.migration_context();
    migrations.ensure_tables().unwrap();
    migrations.insert_version("20240301").unwrap();
    migrations.delete_version("20240215").unwrap();
    assert_eq!(migrations.versions().unwrap(), vec!["20240101", "20240215"]);

    let requests = adapter.transport().requests();
    assert_eq!(requests.len(), 5);
    assert!(requests[0].sql().starts_with("CREATE TABLE IF NOT EXISTS schema_migrations"));
    assert!(requests[1].sql().starts_with("CREATE TABLE IF NOT EXISTS ar_internal_metadata"));
    assert_eq!(
        requests[2].sql(),
        "INSERT INTO schema_migrations (version, active) VALUES ('20240301', 1)"
    );
    assert_eq!(
        requests[3].sql(),
        "INSERT INTO schema_migrations (version, active) VALUES ('20240215', 0)"
    );
    assert_eq!(
        requests[4].sql(),
        "SELECT version FROM schema_migrations FINAL WHERE active = 1 ORDER BY version ASC FORMAT JSONCompact"
    );
}

#[test]
fn test_distributed_service_tables() {
    let mut config = ConnectionConfig::new("db");
    config.cluster = Some("main".to_string());
    config.distributed_service_tables = true;
    let adapter = ClickhouseAdapter::new(MockTransport::empty(), config).unwrap();

    let migrations = adapter.migration_context();
    migrations.ensure_tables().unwrap();
    migrations.insert_version("1").unwrap();

    let requests = adapter.transport().requests();
    assert_eq!(requests.len(), 5);
    assert!(requests[1].sql().contains("schema_migrations_distributed"));
    assert!(requests[1].sql().contains("cityHash64(version)"));
    assert!(requests[3].sql().contains("cityHash64(key)"));
    assert!(
        requests[4]
            .sql()
            .starts_with("INSERT INTO schema_migrations_distributed (version, active)")
    );
}

#[test]
fn test_internal_metadata() {
    let adapter = adapter(MockTransport::new(|sql| {
        if sql.starts_with("SELECT value FROM") {
            Ok(compact(&[("value", "String")], json!([["test"]])))
        } else {
            Ok(WireResponse::ok(""))
        }
    }));
    let migrations = adapter.migration_context();
    migrations.set("environment", "test").unwrap();
    assert_eq!(migrations.get("environment").unwrap().as_deref(), Some("test"));

    let requests = adapter.transport().requests();
    assert!(
        requests[0]
            .sql()
            .starts_with("INSERT INTO ar_internal_metadata (key, value, created_at, updated_at) VALUES ('environment', 'test', '")
    );
    assert_eq!(
        requests[1].sql(),
        "SELECT value FROM ar_internal_metadata FINAL WHERE key = 'environment' LIMIT 1 FORMAT JSONCompact"
    );
}

// =========================================================================
// Streaming
// =========================================================================

#[test]
fn test_stream_rows() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::ok(
            "[\"id\",\"name\"]\n[\"UInt32\",\"String\"]\n[1,\"a\"]\n\n[2,\"b\"]\n",
        ))
    }));
    let mut rows = Vec::new();
    let columns = adapter
        .stream_rows("SELECT id, name FROM t", |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();

    assert_eq!(
        columns,
        vec![ColumnMeta::new("id", "UInt32"), ColumnMeta::new("name", "String")]
    );
    assert_eq!(rows, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
    assert!(
        adapter.transport().requests()[0]
            .sql()
            .ends_with("FORMAT JSONCompactEachRowWithNamesAndTypes")
    );
}

#[test]
fn test_stream_compressed_body() {
    let mut config = ConnectionConfig::new("db");
    config.compression = Some("gzip".to_string());
    let transport = MockTransport::new(|_| {
        let body = compression::compress(b"[\"n\"]\n[\"UInt8\"]\n[1]\n", "gzip").into_owned();
        Ok(WireResponse::ok(body).with_encoding("gzip"))
    });
    let adapter = ClickhouseAdapter::new(transport, config).unwrap();
    let mut count = 0;
    adapter
        .stream_rows("SELECT 1 AS n", |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_stream_stops_on_callback_error() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::ok("[\"n\"]\n[\"UInt8\"]\n[1]\n[2]\n[3]\n"))
    }));
    let mut seen = 0;
    let err = adapter
        .stream_rows("SELECT n FROM t", |_| {
            seen += 1;
            if seen == 2 {
                return Err(AdapterError::invalid("stop"));
            }
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidArgument(_)));
    assert_eq!(seen, 2);
}

#[test]
fn test_stream_server_failures() {
    let adapter = adapter(MockTransport::new(|_| {
        Ok(WireResponse::ok(
            "[\"n\"]\n[\"UInt8\"]\n[1]\nCode: 241. DB::Exception: Memory limit exceeded\n",
        ))
    }));
    let err = adapter.stream_rows("SELECT n FROM t", |_| Ok(())).unwrap_err();
    assert!(matches!(err, AdapterError::Database { .. }));

    let failing = self::adapter(MockTransport::new(|_| {
        Ok(WireResponse::with_status(
            500,
            "Code: 60. DB::Exception: Table db.t does not exist",
        ))
    }));
    let err = failing.stream_rows("SELECT n FROM t", |_| Ok(())).unwrap_err();
    assert!(matches!(err, AdapterError::Database { status: 500, .. }));
}

#[test]
fn test_stream_empty_body() {
    let adapter = adapter(MockTransport::empty());
    let columns = adapter.stream_rows("SELECT 1", |_| Ok(())).unwrap();
    assert!(columns.is_empty());
}

#[test]
fn test_query_options_builder() {
    let options = QueryOptions::default()
        .setting("max_threads", 2)
        .exclude("readonly")
        .format("CSV")
        .without_database();
    assert_eq!(options.settings.get("max_threads").map(String::as_str), Some("2"));
    assert_eq!(options.exclude_settings, vec!["readonly".to_string()]);
    assert_eq!(options.format.as_deref(), Some("CSV"));
    assert!(options.skip_database);
}
