/// Concurrency tests
///
/// Operations submitted without awaiting each other are serialized per store instance
/// Run with: cargo test --test concurrency_tests

use futures::future::join_all;
use jsonstore::{Filter, JsonStore, KeySchema, KeyType, StoreConfig, StoreError};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

async fn open_counter() -> anyhow::Result<JsonStore> {
    open_counter_with(StoreConfig::in_memory()).await
}

async fn open_counter_with(config: StoreConfig) -> anyhow::Result<JsonStore> {
    let store = JsonStore::open(config).await?;
    store
        .create_store("events", KeySchema::new().key("seq", KeyType::Number))?
        .await?;
    Ok(store)
}

#[tokio::test]
async fn test_concurrent_saves_are_all_applied() -> anyhow::Result<()> {
    let store = open_counter().await?;
    let n = 50;

    let pending = (0..n)
        .map(|seq| store.save("events", json!({"seq": seq}), None))
        .collect::<Result<Vec<_>, _>>()?;

    let saved = join_all(pending).await;
    let ids: HashSet<i64> = saved
        .into_iter()
        .map(|doc| doc.map(|doc| doc["id"].as_i64().unwrap()))
        .collect::<Result<_, _>>()?;

    assert_eq!(ids.len(), n);
    assert_eq!(store.get("events", Filter::all())?.await?.len(), n);

    Ok(())
}

#[tokio::test]
async fn test_saves_from_many_tasks() -> anyhow::Result<()> {
    let store = Arc::new(open_counter().await?);
    let num_tasks = 8;
    let saves_per_task = 10;

    let mut handles = vec![];
    for task_id in 0..num_tasks {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..saves_per_task {
                store
                    .save("events", json!({"seq": task_id * 100 + i}), None)?
                    .await?;
            }
            Ok::<_, StoreError>(())
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let docs = store.get("events", Filter::all())?.await?;
    assert_eq!(docs.len(), num_tasks * saves_per_task);

    Ok(())
}

#[tokio::test]
async fn test_operations_start_in_submission_order() -> anyhow::Result<()> {
    let store = open_counter().await?;

    // None of these are awaited until all are submitted
    let save = store.save("events", json!({"id": 1, "seq": 1}), None)?;
    let read_after_save = store.get("events", 1i64)?;
    let delete = store.delete("events", 1i64)?;
    let read_after_delete = store.get("events", 1i64)?;

    let read_after_delete = read_after_delete.await?;
    let removed = delete.await?;
    let read_after_save = read_after_save.await?;
    let saved = save.await?;

    assert_eq!(read_after_save, vec![saved]);
    assert_eq!(removed, 1);
    assert!(read_after_delete.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failure_does_not_abort_siblings() -> anyhow::Result<()> {
    let store = open_counter().await?;

    let before = store.save("events", json!({"seq": 1}), None)?;
    let failing = store.save("missing", json!({"seq": 2}), None)?;
    let after = store.save("events", json!({"seq": 3}), None)?;

    assert!(before.await.is_ok());
    assert!(matches!(failing.await, Err(StoreError::StoreNotFound(_))));
    assert!(after.await.is_ok());
    assert_eq!(store.get("events", Filter::all())?.await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_store_instances_are_independent() -> anyhow::Result<()> {
    let first = open_counter().await?;
    let second = open_counter().await?;

    let a = first.save("events", json!({"seq": 1}), None)?;
    let b = second.save("events", json!({"seq": 2}), None)?;
    let (a, b) = tokio::join!(a, b);
    a?;
    b?;

    // Each in-memory database only sees its own document
    assert_eq!(first.get("events", Filter::all())?.await?.len(), 1);
    assert_eq!(second.get("events", Filter::all())?.await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_close_waits_for_queued_work() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("events.db");
    let store = open_counter_with(StoreConfig::new(path.to_string_lossy().to_string())).await?;

    let pending = (0..20)
        .map(|seq| store.save("events", json!({"seq": seq}), None))
        .collect::<Result<Vec<_>, _>>()?;

    store.close().await?;

    for result in join_all(pending).await {
        assert!(result.is_ok());
    }
    assert!(matches!(
        store.save("events", json!({"seq": 99}), None),
        Err(StoreError::QueueClosed)
    ));

    let saved: i64 = Connection::open(&path)?.query_row("SELECT COUNT(*) FROM `events`", [], |row| row.get(0))?;
    assert_eq!(saved, 20);

    Ok(())
}
