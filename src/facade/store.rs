use crate::config::StoreConfig;
use crate::core::{KeySchema, Row, StoreError, StoreMeta, StoreResult};
use crate::criteria::{Criteria, Filter};
use crate::driver::{Driver, SqliteDriver};
use crate::queue::{OperationQueue, Pending};
use crate::schema::{validate_key_name, validate_store_name};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// JSON document store
///
/// Stores arbitrary JSON objects in named stores backed by SQL tables. Each
/// store declares a set of keys that become indexed columns; the full
/// document is kept alongside them.
///
/// Every method validates its arguments immediately and returns an `Err`
/// without touching the database if they are malformed. Otherwise the
/// operation is queued and the returned [`Pending`] resolves once it has
/// run. Operations on one `JsonStore` run one at a time, in the order they
/// were submitted.
///
/// # Examples
///
/// ```
/// # use jsonstore::{JsonStore, KeySchema, KeyType, StoreConfig};
/// # use serde_json::json;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = JsonStore::open(StoreConfig::in_memory()).await?;
///
/// store
///     .create_store("people", KeySchema::new().key("name", KeyType::String))?
///     .await?;
///
/// let saved = store.save("people", json!({"name": "Mario"}), None)?.await?;
/// let found = store.get("people", saved["id"].as_i64().unwrap())?.await?;
/// assert_eq!(found, vec![saved]);
/// # Ok(())
/// # }
/// ```
pub struct JsonStore {
    driver: Arc<dyn Driver>,
    queue: OperationQueue,
    config: StoreConfig,
}

impl JsonStore {
    /// Open a SQLite-backed store
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let driver = SqliteDriver::open(&config).await?;
        Self::with_driver(Arc::new(driver), config)
    }

    /// Open from a connection string, see [`StoreConfig::from_url`]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        Self::open(StoreConfig::from_url(url)?).await
    }

    /// Build a store on top of an existing driver. Must be called inside a
    /// tokio runtime.
    pub fn with_driver(driver: Arc<dyn Driver>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            driver,
            queue: OperationQueue::new()?,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create a store with the given declared keys.
    ///
    /// An `id` key of type number is added when not declared.
    pub fn create_store(&self, name: &str, keys: KeySchema) -> StoreResult<Pending<()>> {
        validate_store_name(name)?;
        for (key, _) in keys.iter() {
            validate_key_name(key)?;
        }

        let keys = keys.with_default_id();
        let name = name.to_string();
        let driver = Arc::clone(&self.driver);
        debug!(store = %name, "queueing create store");

        self.queue
            .enqueue(move || async move { driver.create_store(&name, &keys).await })
    }

    /// Drop a store and its catalog entry.
    pub fn delete_store(&self, name: &str) -> StoreResult<Pending<()>> {
        validate_store_name(name)?;

        let name = name.to_string();
        let driver = Arc::clone(&self.driver);
        debug!(store = %name, "queueing delete store");

        self.queue
            .enqueue(move || async move { driver.delete_store(&name).await })
    }

    /// Declared keys of a store.
    pub fn get_metadata(&self, store: &str) -> StoreResult<Pending<StoreMeta>> {
        validate_store_name(store)?;

        let store = store.to_string();
        let driver = Arc::clone(&self.driver);
        self.queue
            .enqueue(move || async move { driver.get_metadata(&store).await })
    }

    /// Insert or replace a document.
    ///
    /// Declared keys in `overrides` take precedence over the document's own
    /// fields; an `id` override is also written into the document. When no
    /// `id` is known the backend generates one and the resolved document
    /// carries it.
    pub fn save(
        &self,
        store: &str,
        object: JsonValue,
        overrides: Option<Row>,
    ) -> StoreResult<Pending<JsonValue>> {
        validate_store_name(store)?;
        ensure_document(&object)?;

        let store = store.to_string();
        let overrides = overrides.unwrap_or_default();
        let driver = Arc::clone(&self.driver);

        self.queue
            .enqueue(move || async move { driver.save(&store, object, &overrides).await })
    }

    /// Save several documents in one transaction. Either all are persisted
    /// or none is.
    pub fn save_all(
        &self,
        store: &str,
        objects: Vec<JsonValue>,
    ) -> StoreResult<Pending<Vec<JsonValue>>> {
        validate_store_name(store)?;
        for object in &objects {
            ensure_document(object)?;
        }

        let store = store.to_string();
        let driver = Arc::clone(&self.driver);

        self.queue
            .enqueue(move || async move { driver.save_all(&store, objects).await })
    }

    /// Documents matching `filter`.
    ///
    /// `filter` accepts criteria trees, JSON criteria, or a bare id
    /// (`store.get("people", 5i64)`). [`Filter::all`] matches everything.
    pub fn get(&self, store: &str, filter: impl Into<Filter>) -> StoreResult<Pending<Vec<JsonValue>>> {
        let (store, criteria) = self.prepare(store, filter)?;
        let driver = Arc::clone(&self.driver);

        self.queue
            .enqueue(move || async move { driver.get(&store, &criteria).await })
    }

    /// Like [`get`](Self::get), deserializing each document into `T`.
    pub fn get_as<T>(&self, store: &str, filter: impl Into<Filter>) -> StoreResult<Pending<Vec<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (store, criteria) = self.prepare(store, filter)?;
        let driver = Arc::clone(&self.driver);

        self.queue.enqueue(move || async move {
            driver
                .get(&store, &criteria)
                .await?
                .into_iter()
                .map(|document| {
                    serde_json::from_value(document).map_err(|err| {
                        StoreError::MalformedStoredDocument(format!(
                            "document in '{}' does not match requested type: {}",
                            store, err
                        ))
                    })
                })
                .collect()
        })
    }

    /// Deliver matching documents to `on_row` one at a time.
    ///
    /// `on_row(document, is_last_row, row_index)` is called once per row, and
    /// exactly once with `is_last_row == true`: with `Ok(Value::Null)` when
    /// nothing matched, or with the error that stopped the stream. Resolves
    /// to the number of documents delivered.
    pub fn stream<F>(
        &self,
        store: &str,
        filter: impl Into<Filter>,
        on_row: F,
    ) -> StoreResult<Pending<usize>>
    where
        F: FnMut(StoreResult<JsonValue>, bool, usize) + Send + 'static,
    {
        let (store, criteria) = self.prepare(store, filter)?;
        let driver = Arc::clone(&self.driver);

        self.queue.enqueue(move || async move {
            let mut on_row = on_row;
            driver.stream(&store, &criteria, &mut on_row).await
        })
    }

    /// Delete matching documents; [`Filter::all`] empties the store.
    /// Resolves to the number of rows removed.
    pub fn delete(&self, store: &str, filter: impl Into<Filter>) -> StoreResult<Pending<usize>> {
        let (store, criteria) = self.prepare(store, filter)?;
        let driver = Arc::clone(&self.driver);

        self.queue
            .enqueue(move || async move { driver.delete(&store, &criteria).await })
    }

    /// Stop accepting operations and wait for queued ones to finish.
    pub async fn close(&self) -> StoreResult<()> {
        self.queue.close().await
    }

    fn prepare(&self, store: &str, filter: impl Into<Filter>) -> StoreResult<(String, Vec<Criteria>)> {
        validate_store_name(store)?;
        let criteria = filter.into().resolve(self.config.strict_criteria)?;
        Ok((store.to_string(), criteria))
    }
}

fn ensure_document(object: &JsonValue) -> StoreResult<()> {
    if object.is_object() {
        Ok(())
    } else {
        Err(StoreError::invalid(format!(
            "document must be a JSON object, got {}",
            kind_of(object)
        )))
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
