use super::{Driver, MetadataCache, RowStream, sql};
use crate::config::StoreConfig;
use crate::core::{ExecOutcome, KeySchema, Row, StoreError, StoreMeta, StoreResult};
use crate::dialect::{Dialect, SqliteDialect};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Number, Value as JsonValue};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// SQLite backend
///
/// One connection behind a mutex; every statement runs on the blocking pool.
/// Catalog entries are cached per store and invalidated by this driver's own
/// `create_store` / `delete_store`.
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
    dialect: SqliteDialect,
    cache: MetadataCache,
    stream_buffer: usize,
}

impl SqliteDriver {
    /// Open the database named by `config`
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let path = config.path.clone();
        let busy_timeout = config.busy_timeout;
        let in_memory = config.is_in_memory();

        let conn = tokio::task::spawn_blocking(move || -> StoreResult<Connection> {
            let conn = if in_memory {
                Connection::open_in_memory()?
            } else {
                Connection::open(&path)?
            };
            conn.busy_timeout(busy_timeout)?;
            Ok(conn)
        })
        .await??;

        info!(path = %config.path, "opened sqlite database");

        Ok(Self::from_connection(conn, config))
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection, config: &StoreConfig) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            dialect: SqliteDialect,
            cache: MetadataCache::new(config.metadata_cache_capacity),
            stream_buffer: config.stream_buffer.max(1),
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    async fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock()?;
            f(&mut guard)
        })
        .await?
    }
}

fn to_sql_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_sql_params(params: &[JsonValue]) -> Vec<SqlValue> {
    params.iter().map(to_sql_value).collect()
}

/// Text and blob cells must be valid UTF-8; anything else is reported
/// rather than repaired.
fn from_sql_value(value: ValueRef<'_>) -> StoreResult<JsonValue> {
    Ok(match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|err| {
                StoreError::MalformedStoredDocument(format!("column holds invalid UTF-8: {}", err))
            })?;
            JsonValue::String(text.to_string())
        }
    })
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> StoreResult<Row> {
    let mut out = Row::new();
    for (i, name) in columns.iter().enumerate() {
        out.insert(name.clone(), from_sql_value(row.get_ref(i)?)?);
    }
    Ok(out)
}

fn query_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> StoreResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_row(row, &columns)?);
    }
    Ok(out)
}

/// Read rows into `tx` until the cursor is exhausted or the receiver is gone.
fn produce_rows(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    tx: &mpsc::Sender<StoreResult<Row>>,
) -> StoreResult<()> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        if tx.blocking_send(read_row(row, &columns)).is_err() {
            debug!("stream consumer went away, stopping cursor");
            break;
        }
    }
    Ok(())
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[JsonValue]) -> StoreResult<Vec<Row>> {
        debug!(sql, params = params.len(), "query");
        let sql = sql.to_string();
        let params = to_sql_params(params);
        self.with_connection(move |conn| query_rows(conn, &sql, &params))
            .await
    }

    async fn exec(&self, sql: &str, params: &[JsonValue]) -> StoreResult<ExecOutcome> {
        debug!(sql, params = params.len(), "exec");
        let sql = sql.to_string();
        let params = to_sql_params(params);
        self.with_connection(move |conn| {
            let rows_affected = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(ExecOutcome {
                rows_affected,
                last_insert_id: (rows_affected > 0).then(|| conn.last_insert_rowid()),
            })
        })
        .await
    }

    async fn query_stream(&self, sql: &str, params: &[JsonValue]) -> StoreResult<RowStream> {
        debug!(sql, params = params.len(), "query stream");
        let sql = sql.to_string();
        let params = to_sql_params(params);
        let conn = Arc::clone(&self.conn);
        let (tx, rx) = mpsc::channel(self.stream_buffer);

        tokio::task::spawn_blocking(move || {
            let result = conn
                .lock()
                .map_err(StoreError::from)
                .and_then(|guard| produce_rows(&guard, &sql, &params, &tx));
            if let Err(err) = result {
                let _ = tx.blocking_send(Err(err));
            }
        });

        let rows = stream::unfold(rx, |mut rx| async move {
            let row = rx.recv().await?;
            Some((row, rx))
        });

        Ok(rows.boxed())
    }

    async fn get_metadata(&self, store: &str) -> StoreResult<StoreMeta> {
        if let Some(meta) = self.cache.get(store) {
            return Ok(meta);
        }

        let meta = sql::fetch_metadata(self, store).await?;
        self.cache.put(store, meta.clone());
        Ok(meta)
    }

    async fn create_store(&self, name: &str, keys: &KeySchema) -> StoreResult<()> {
        self.cache.invalidate(name);
        sql::create_store(self, name, keys).await
    }

    async fn delete_store(&self, name: &str) -> StoreResult<()> {
        let result = sql::delete_store(self, name).await;
        self.cache.invalidate(name);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_driver() -> SqliteDriver {
        SqliteDriver::open(&StoreConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_exec_and_query() {
        let driver = memory_driver().await;
        driver
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL)", &[])
            .await
            .unwrap();

        let outcome = driver
            .exec("INSERT INTO t (name, score) VALUES (?, ?)", &[json!("a"), json!(1.5)])
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let rows = driver
            .query("SELECT id, name, score FROM t WHERE name = ?", &[json!("a")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[0]["score"], json!(1.5));
    }

    #[tokio::test]
    async fn test_bool_and_object_params() {
        let driver = memory_driver().await;
        driver.exec("CREATE TABLE t (flag INTEGER, doc TEXT)", &[]).await.unwrap();
        driver
            .exec("INSERT INTO t VALUES (?, ?)", &[json!(true), json!({"a": 1})])
            .await
            .unwrap();

        let rows = driver.query("SELECT flag, doc FROM t", &[]).await.unwrap();
        assert_eq!(rows[0]["flag"], json!(1));
        assert_eq!(rows[0]["doc"], json!("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_zero_rowid_is_reported() {
        let driver = memory_driver().await;
        driver.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).await.unwrap();

        let outcome = driver
            .exec("INSERT INTO t (id, name) VALUES (?, ?)", &[json!(0), json!("zero")])
            .await
            .unwrap();
        assert_eq!(outcome.last_insert_id, Some(0));

        let outcome = driver
            .exec("DELETE FROM t WHERE id = ?", &[json!(42)])
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 0);
        assert_eq!(outcome.last_insert_id, None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_reported() {
        let driver = memory_driver().await;
        driver.exec("CREATE TABLE t (doc TEXT)", &[]).await.unwrap();
        driver
            .exec("INSERT INTO t VALUES (CAST(X'7BFF7D' AS TEXT))", &[])
            .await
            .unwrap();

        assert!(matches!(
            driver.query("SELECT doc FROM t", &[]).await,
            Err(StoreError::MalformedStoredDocument(_))
        ));

        let rows: Vec<_> = driver.query_stream("SELECT doc FROM t", &[]).await.unwrap().collect().await;
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0], Err(StoreError::MalformedStoredDocument(_))));
    }

    #[tokio::test]
    async fn test_query_stream_yields_every_row() {
        let driver = SqliteDriver::open(&StoreConfig::in_memory().stream_buffer(2))
            .await
            .unwrap();
        driver.exec("CREATE TABLE t (n INTEGER)", &[]).await.unwrap();
        for n in 0..10 {
            driver.exec("INSERT INTO t VALUES (?)", &[json!(n)]).await.unwrap();
        }

        let rows: Vec<_> = driver
            .query_stream("SELECT n FROM t ORDER BY n", &[])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(rows.len(), 10);
        assert_eq!(rows[9].as_ref().unwrap()["n"], json!(9));
    }

    #[tokio::test]
    async fn test_query_stream_reports_bad_sql() {
        let driver = memory_driver().await;
        let rows: Vec<_> = driver
            .query_stream("SELECT * FROM missing", &[])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0], Err(StoreError::BackendFailure(_))));
    }

    #[tokio::test]
    async fn test_metadata_is_cached_and_invalidated() {
        let driver = memory_driver().await;
        let keys = KeySchema::new()
            .key("name", crate::core::KeyType::String)
            .with_default_id();
        driver.create_store("people", &keys).await.unwrap();

        let meta = driver.get_metadata("people").await.unwrap();
        assert!(meta.is_declared("name"));
        assert_eq!(driver.cache().len(), 1);

        driver.delete_store("people").await.unwrap();
        assert!(driver.cache().is_empty());
        assert!(matches!(
            driver.get_metadata("people").await,
            Err(StoreError::StoreNotFound(_))
        ));
    }
}
