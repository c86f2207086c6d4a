//! Shared SQL routines for drivers
//!
//! These implement the provided [`Driver`] methods on top of the statement
//! primitives. Every multi-statement routine brackets its work in a
//! transaction and always ends it: commit on success, rollback on any
//! failure, including failures of the commit itself.

use super::{Driver, RowCallback};
use crate::core::{
    CREATED_COLUMN, DOCUMENT_COLUMN, ID_KEY, KeySchema, META_TABLE, Row, StoreError, StoreMeta,
    StoreResult,
};
use crate::criteria::{Criteria, compile_where};
use crate::dialect::Dialect;
use crate::schema::{PlannedStatement, plan_create_store, plan_delete_store};
use async_recursion::async_recursion;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

/// Execute a planned statement list, rolling back an open transaction if
/// any step fails.
pub async fn run_plan<D: Driver + ?Sized>(driver: &D, plan: &[PlannedStatement]) -> StoreResult<()> {
    let mut in_transaction = false;

    for statement in plan {
        let step = match statement {
            PlannedStatement::Begin => driver.transaction_begin().await,
            PlannedStatement::Execute(sql) => driver.exec(sql, &[]).await.map(|_| ()),
            PlannedStatement::Commit => driver.transaction_commit().await,
        };

        if let Err(err) = step {
            if in_transaction {
                rollback(driver, &err).await;
            }
            return Err(err);
        }

        match statement {
            PlannedStatement::Begin => in_transaction = true,
            PlannedStatement::Commit => in_transaction = false,
            PlannedStatement::Execute(_) => {}
        }
    }

    Ok(())
}

async fn rollback<D: Driver + ?Sized>(driver: &D, cause: &StoreError) {
    warn!(error = %cause, "rolling back transaction");
    if let Err(err) = driver.transaction_rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Commit if `result` is a success, otherwise roll back. A failed commit is
/// rolled back too and its error returned.
async fn finish<D: Driver + ?Sized, T: Send>(driver: &D, result: StoreResult<T>) -> StoreResult<T> {
    match result {
        Ok(value) => match driver.transaction_commit().await {
            Ok(()) => Ok(value),
            Err(err) => {
                rollback(driver, &err).await;
                Err(err)
            }
        },
        Err(err) => {
            rollback(driver, &err).await;
            Err(err)
        }
    }
}

pub async fn fetch_metadata<D: Driver + ?Sized>(driver: &D, store: &str) -> StoreResult<StoreMeta> {
    let dialect = driver.dialect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        dialect.quote_ident("data"),
        dialect.quote_ident(META_TABLE),
        dialect.quote_ident("store"),
        dialect.placeholder(1)
    );

    let rows = driver.query(&sql, &[JsonValue::String(store.to_string())]).await?;
    let row = rows
        .first()
        .ok_or_else(|| StoreError::StoreNotFound(store.to_string()))?;

    let data = row.get("data").and_then(JsonValue::as_str).ok_or_else(|| {
        StoreError::MalformedStoredDocument(format!("catalog entry for '{}' has no data", store))
    })?;

    serde_json::from_str(data).map_err(|err| {
        StoreError::MalformedStoredDocument(format!("catalog entry for '{}': {}", store, err))
    })
}

pub async fn create_store<D: Driver + ?Sized>(
    driver: &D,
    name: &str,
    keys: &KeySchema,
) -> StoreResult<()> {
    let plan = plan_create_store(name, keys, driver.dialect())?;
    run_plan(driver, &plan).await?;
    info!(store = name, keys = ?keys.names(), "created store");
    Ok(())
}

pub async fn delete_store<D: Driver + ?Sized>(driver: &D, name: &str) -> StoreResult<()> {
    let plan = plan_delete_store(name, driver.dialect());
    run_plan(driver, &plan).await?;
    info!(store = name, "deleted store");
    Ok(())
}

pub async fn save<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    object: JsonValue,
    overrides: &Row,
) -> StoreResult<JsonValue> {
    driver.transaction_begin().await?;

    let result = match driver.get_metadata(store).await {
        Ok(meta) => write_document(driver, store, &meta, object, overrides, false).await,
        Err(err) => Err(err),
    };

    finish(driver, result).await
}

/// Save several documents inside one transaction. Either every document is
/// persisted or none is.
pub async fn save_all<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    objects: Vec<JsonValue>,
) -> StoreResult<Vec<JsonValue>> {
    driver.transaction_begin().await?;

    let result = async {
        let meta = driver.get_metadata(store).await?;
        let overrides = Row::new();
        let mut saved = Vec::with_capacity(objects.len());
        for object in objects {
            saved.push(write_document(driver, store, &meta, object, &overrides, false).await?);
        }
        Ok::<_, StoreError>(saved)
    }
    .await;

    finish(driver, result).await
}

/// Upsert one document. Must run inside a transaction.
///
/// When neither the document nor the overrides carry an `id`, the row is
/// inserted without one, the generated identifier is written into the
/// document, and the document is written a second time so the stored JSON
/// includes it.
#[async_recursion]
async fn write_document<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    meta: &StoreMeta,
    mut object: JsonValue,
    overrides: &Row,
    backfilled: bool,
) -> StoreResult<JsonValue> {
    let mut columns = Row::new();
    {
        let fields = object
            .as_object_mut()
            .ok_or_else(|| StoreError::invalid("document must be a JSON object"))?;

        for (key, value) in fields.iter() {
            if meta.is_declared(key) {
                columns.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in overrides {
            if meta.is_declared(key) && !(key == ID_KEY && value.is_null()) {
                columns.insert(key.clone(), value.clone());
            }
        }
        if let Some(id) = overrides.get(ID_KEY).filter(|id| !id.is_null()) {
            fields.insert(ID_KEY.to_string(), id.clone());
        }
    }

    let has_id = columns.get(ID_KEY).is_some_and(|id| !id.is_null());
    if !has_id {
        if backfilled {
            return Err(StoreError::MissingIdentifier(format!(
                "store '{}' does not record the generated id as a key",
                store
            )));
        }
        columns.remove(ID_KEY);
    }

    columns.insert(
        DOCUMENT_COLUMN.to_string(),
        JsonValue::String(serde_json::to_string(&object)?),
    );

    let (sql, params) = upsert_statement(driver.dialect(), store, &columns);
    let outcome = driver.exec(&sql, &params).await?;

    if has_id {
        return Ok(object);
    }

    let id = outcome.last_insert_id.ok_or_else(|| {
        StoreError::MissingIdentifier(format!(
            "no id in document and none generated by the backend for store '{}'",
            store
        ))
    })?;

    debug!(store, id, "back-filling generated id");
    if let Some(fields) = object.as_object_mut() {
        fields.insert(ID_KEY.to_string(), JsonValue::from(id));
    }
    write_document(driver, store, meta, object, overrides, true).await
}

fn upsert_statement(dialect: &dyn Dialect, store: &str, columns: &Row) -> (String, Vec<JsonValue>) {
    let names: Vec<String> = columns.keys().map(|key| dialect.quote_ident(key)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();

    let sql = format!(
        "{} {} ({}) VALUES ({})",
        dialect.upsert_verb(),
        dialect.quote_ident(store),
        names.join(", "),
        placeholders.join(", ")
    );

    (sql, columns.values().cloned().collect())
}

fn select_documents(dialect: &dyn Dialect, store: &str, criteria: &[Criteria]) -> (String, Vec<JsonValue>) {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT {} FROM {}{}",
        dialect.quote_ident(DOCUMENT_COLUMN),
        dialect.quote_ident(store),
        compile_where(criteria, dialect, Some(&mut params))
    );
    (sql, params)
}

/// Reject criteria comparing a column the store does not have. An unknown
/// name would otherwise reach the engine as an identifier it cannot resolve.
fn check_criteria_keys(store: &str, meta: &StoreMeta, criteria: &[Criteria]) -> StoreResult<()> {
    let unknown = criteria
        .iter()
        .flat_map(Criteria::keys)
        .find(|key| *key != CREATED_COLUMN && !meta.is_declared(key));

    match unknown {
        Some(key) => Err(StoreError::InvalidArgument(format!(
            "key '{}' is not declared by store '{}'",
            key, store
        ))),
        None => Ok(()),
    }
}

async fn check_filter<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    criteria: &[Criteria],
) -> StoreResult<()> {
    let meta = driver.get_metadata(store).await?;
    check_criteria_keys(store, &meta, criteria)
}

fn parse_document(row: &Row) -> StoreResult<JsonValue> {
    let text = row
        .get(DOCUMENT_COLUMN)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| StoreError::MalformedStoredDocument("row has no document text".to_string()))?;

    serde_json::from_str(text).map_err(|err| StoreError::MalformedStoredDocument(err.to_string()))
}

pub async fn get<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    criteria: &[Criteria],
) -> StoreResult<Vec<JsonValue>> {
    check_filter(driver, store, criteria).await?;
    let (sql, params) = select_documents(driver.dialect(), store, criteria);
    let rows = driver.query(&sql, &params).await?;
    rows.iter().map(parse_document).collect()
}

/// Deliver matching documents one at a time. The row after the current one
/// is read before the callback fires so the last row can be flagged.
pub async fn stream<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    criteria: &[Criteria],
    on_row: &mut RowCallback<'_>,
) -> StoreResult<usize> {
    if let Err(err) = check_filter(driver, store, criteria).await {
        on_row(Err(err.clone()), true, 0);
        return Err(err);
    }
    let (sql, params) = select_documents(driver.dialect(), store, criteria);

    let mut rows = match driver.query_stream(&sql, &params).await {
        Ok(rows) => rows,
        Err(err) => {
            on_row(Err(err.clone()), true, 0);
            return Err(err);
        }
    };

    let mut held: Option<JsonValue> = None;
    let mut index = 0;

    while let Some(row) = rows.next().await {
        match row.and_then(|row| parse_document(&row)) {
            Ok(document) => {
                if let Some(previous) = held.replace(document) {
                    on_row(Ok(previous), false, index);
                    index += 1;
                }
            }
            Err(err) => {
                if let Some(previous) = held.take() {
                    on_row(Ok(previous), false, index);
                    index += 1;
                }
                on_row(Err(err.clone()), true, index);
                return Err(err);
            }
        }
    }

    match held {
        Some(last) => {
            on_row(Ok(last), true, index);
            Ok(index + 1)
        }
        None => {
            on_row(Ok(JsonValue::Null), true, 0);
            Ok(0)
        }
    }
}

pub async fn delete<D: Driver + ?Sized>(
    driver: &D,
    store: &str,
    criteria: &[Criteria],
) -> StoreResult<usize> {
    check_filter(driver, store, criteria).await?;
    let dialect = driver.dialect();
    let mut params = Vec::new();
    let sql = format!(
        "DELETE FROM {}{}",
        dialect.quote_ident(store),
        compile_where(criteria, dialect, Some(&mut params))
    );

    let outcome = driver.exec(&sql, &params).await?;
    Ok(outcome.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Operator;
    use crate::dialect::SqliteDialect;
    use serde_json::json;

    #[test]
    fn test_upsert_statement() {
        let mut columns = Row::new();
        columns.insert("id".into(), json!(7));
        columns.insert("foo".into(), json!("b"));
        columns.insert(DOCUMENT_COLUMN.into(), json!("{\"id\":7,\"foo\":\"b\"}"));

        let (sql, params) = upsert_statement(&SqliteDialect, "test", &columns);
        assert_eq!(
            sql,
            "INSERT OR REPLACE INTO `test` (`id`, `foo`, `__jsondata`) VALUES (?, ?, ?)"
        );
        assert_eq!(params, vec![json!(7), json!("b"), json!("{\"id\":7,\"foo\":\"b\"}")]);
    }

    #[test]
    fn test_select_documents() {
        let (sql, params) = select_documents(
            &SqliteDialect,
            "test",
            &[Criteria::compare("age", Operator::Gt, 10)],
        );
        assert_eq!(sql, "SELECT `__jsondata` FROM `test` WHERE ((`age` > ?))");
        assert_eq!(params, vec![json!(10)]);

        let (sql, params) = select_documents(&SqliteDialect, "test", &[]);
        assert_eq!(sql, "SELECT `__jsondata` FROM `test`");
        assert!(params.is_empty());
    }

    #[test]
    fn test_check_criteria_keys() {
        let meta = StoreMeta {
            keys: vec!["id".into(), "name".into()],
        };

        let known = [
            Criteria::eq("name", "Mario"),
            Criteria::or(vec![Criteria::id(1), Criteria::compare(CREATED_COLUMN, Operator::Gt, "2020")]),
        ];
        assert!(check_criteria_keys("people", &meta, &known).is_ok());
        assert!(check_criteria_keys("people", &meta, &[]).is_ok());

        let nested = [Criteria::eq("name", "Mario").with_nested(Criteria::or(vec![Criteria::eq("hat", "hat")]))];
        match check_criteria_keys("people", &meta, &nested) {
            Err(StoreError::InvalidArgument(message)) => assert!(message.contains("'hat'")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_document() {
        let mut row = Row::new();
        row.insert(DOCUMENT_COLUMN.into(), json!("{\"name\":\"Mario\"}"));
        assert_eq!(parse_document(&row).unwrap(), json!({"name": "Mario"}));

        row.insert(DOCUMENT_COLUMN.into(), json!("{not json"));
        assert!(matches!(
            parse_document(&row),
            Err(StoreError::MalformedStoredDocument(_))
        ));

        row.insert(DOCUMENT_COLUMN.into(), JsonValue::Null);
        assert!(matches!(
            parse_document(&row),
            Err(StoreError::MalformedStoredDocument(_))
        ));
    }
}
