//! Backend drivers
//!
//! A [`Driver`] executes single statements against one relational engine
//! connection. Everything above that (catalog lookups, store DDL, save,
//! get, stream, delete) has a provided implementation in terms of the
//! statement primitives, so a new backend only needs `dialect`, `query`,
//! `exec` and `query_stream`. Backends override the provided methods where
//! they can do better, e.g. caching catalog rows.
//!
//! Drivers are not internally serialized. Callers that share one driver
//! between concurrent operations must order them, which is what the store's
//! operation queue does.

mod cache;
pub mod sql;
mod sqlite;

pub use cache::MetadataCache;
pub use sqlite::SqliteDriver;

use crate::core::{ExecOutcome, KeySchema, Row, StoreMeta, StoreResult};
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;

/// Rows produced one at a time by [`Driver::query_stream`].
pub type RowStream = BoxStream<'static, StoreResult<Row>>;

/// Per-row callback of [`Driver::stream`]: `(document, is_last_row, row_index)`.
pub type RowCallback<'a> = dyn FnMut(StoreResult<JsonValue>, bool, usize) + Send + 'a;

#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Execute a statement that returns rows.
    async fn query(&self, sql: &str, params: &[JsonValue]) -> StoreResult<Vec<Row>>;

    /// Execute a statement that does not return rows.
    async fn exec(&self, sql: &str, params: &[JsonValue]) -> StoreResult<ExecOutcome>;

    /// Execute a statement that returns rows, yielding them as they are read.
    async fn query_stream(&self, sql: &str, params: &[JsonValue]) -> StoreResult<RowStream>;

    async fn transaction_begin(&self) -> StoreResult<()> {
        let sql = self.dialect().begin_statement();
        self.exec(sql, &[]).await.map(|_| ())
    }

    async fn transaction_commit(&self) -> StoreResult<()> {
        let sql = self.dialect().commit_statement();
        self.exec(sql, &[]).await.map(|_| ())
    }

    async fn transaction_rollback(&self) -> StoreResult<()> {
        let sql = self.dialect().rollback_statement();
        self.exec(sql, &[]).await.map(|_| ())
    }

    /// Catalog entry of `store`; `StoreNotFound` if the store has none.
    async fn get_metadata(&self, store: &str) -> StoreResult<StoreMeta> {
        sql::fetch_metadata(self, store).await
    }

    async fn create_store(&self, name: &str, keys: &KeySchema) -> StoreResult<()> {
        sql::create_store(self, name, keys).await
    }

    async fn delete_store(&self, name: &str) -> StoreResult<()> {
        sql::delete_store(self, name).await
    }

    async fn save(&self, store: &str, object: JsonValue, overrides: &Row) -> StoreResult<JsonValue> {
        sql::save(self, store, object, overrides).await
    }

    async fn save_all(&self, store: &str, objects: Vec<JsonValue>) -> StoreResult<Vec<JsonValue>> {
        sql::save_all(self, store, objects).await
    }

    async fn get(&self, store: &str, criteria: &[Criteria]) -> StoreResult<Vec<JsonValue>> {
        sql::get(self, store, criteria).await
    }

    async fn stream(
        &self,
        store: &str,
        criteria: &[Criteria],
        on_row: &mut RowCallback<'_>,
    ) -> StoreResult<usize> {
        sql::stream(self, store, criteria, on_row).await
    }

    async fn delete(&self, store: &str, criteria: &[Criteria]) -> StoreResult<usize> {
        sql::delete(self, store, criteria).await
    }
}
