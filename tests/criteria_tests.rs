/// Criteria tests
///
/// Filters given as JSON criteria, criteria trees and id shorthands, run against SQLite
/// Run with: cargo test --test criteria_tests

use jsonstore::{Criteria, Filter, JsonStore, KeySchema, KeyType, Operator, StoreConfig, StoreError};
use serde_json::{Value, json};

async fn open_people(config: StoreConfig) -> anyhow::Result<JsonStore> {
    let store = JsonStore::open(config).await?;
    store
        .create_store(
            "people",
            KeySchema::new()
                .key("name", KeyType::String)
                .key("age", KeyType::Number)
                .key("city", KeyType::String),
        )?
        .await?;

    let people = vec![
        json!({"id": 1, "name": "Mario", "age": 32, "city": "Brooklyn"}),
        json!({"id": 2, "name": "Luigi", "age": 30, "city": "Brooklyn"}),
        json!({"id": 3, "name": "Peach", "age": 18, "city": "Mushroom"}),
        json!({"id": 4, "name": "Toad", "age": 12, "city": "Mushroom"}),
        json!({"id": 5, "name": "Yoshi", "age": 8, "city": null}),
    ];
    store.save_all("people", people)?.await?;
    Ok(store)
}

fn names(docs: &[Value]) -> Vec<&str> {
    docs.iter().map(|doc| doc["name"].as_str().unwrap()).collect()
}

#[tokio::test]
async fn test_equality_leaf() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store.get("people", json!({"where": "name", "=": "Mario"}))?.await?;
    assert_eq!(names(&found), vec!["Mario"]);

    Ok(())
}

#[tokio::test]
async fn test_and_range() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store
        .get(
            "people",
            json!({"and": [{"where": "age", ">": 10}, {"where": "age", "<": 20}]}),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Peach", "Toad"]);

    Ok(())
}

#[tokio::test]
async fn test_or_group() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store
        .get(
            "people",
            json!({"or": [{"where": "name", "=": "Toad"}, {"where": "age", ">=": 32}]}),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Mario", "Toad"]);

    Ok(())
}

#[tokio::test]
async fn test_scalar_means_id() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let by_json = store.get("people", json!(5))?.await?;
    let by_tree = store.get("people", json!({"where": "id", "=": 5}))?.await?;
    let by_shorthand = store.get("people", 5i64)?.await?;

    assert_eq!(names(&by_json), vec!["Yoshi"]);
    assert_eq!(by_json, by_tree);
    assert_eq!(by_json, by_shorthand);

    Ok(())
}

#[tokio::test]
async fn test_leaf_with_nested_group() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    // city = Brooklyn AND (age < 31)
    let found = store
        .get(
            "people",
            json!({"where": "city", "=": "Brooklyn", "and": [{"where": "age", "<": 31}]}),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Luigi"]);

    // age < 10 OR (name = Mario)
    let found = store
        .get(
            "people",
            json!({"where": "age", "<": 10, "or": [{"where": "name", "=": "Mario"}]}),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Mario", "Yoshi"]);

    Ok(())
}

#[tokio::test]
async fn test_nested_groups() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let tree = Criteria::or(vec![
        Criteria::and(vec![
            Criteria::eq("city", "Mushroom"),
            Criteria::compare("age", Operator::Lt, 15),
        ]),
        Criteria::eq("name", "Luigi"),
    ]);
    let found = store.get("people", tree)?.await?;
    assert_eq!(names(&found), vec!["Luigi", "Toad"]);

    Ok(())
}

#[tokio::test]
async fn test_filter_list_is_conjunction() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store
        .get(
            "people",
            json!([{"where": "city", "=": "Brooklyn"}, {"where": "name", "!=": "Mario"}]),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Luigi"]);

    let found = store
        .get(
            "people",
            vec![
                Criteria::compare("age", Operator::Gt, 10),
                Criteria::compare("age", Operator::Le, 18),
            ],
        )?
        .await?;
    assert_eq!(names(&found), vec!["Peach", "Toad"]);

    Ok(())
}

#[tokio::test]
async fn test_null_comparisons() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store.get("people", json!({"where": "city", "=": null}))?.await?;
    assert_eq!(names(&found), vec!["Yoshi"]);

    let found = store.get("people", json!({"where": "city", "!=": null}))?.await?;
    assert_eq!(found.len(), 4);

    Ok(())
}

#[tokio::test]
async fn test_values_are_bound_not_inlined() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let found = store
        .get("people", json!({"where": "name", "=": "x' OR '1'='1"}))?
        .await?;
    assert!(found.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_malformed_criteria_are_dropped() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    // No `where`: the filter is dropped and everything matches
    let found = store.get("people", json!({"name": "Mario"}))?.await?;
    assert_eq!(found.len(), 5);

    // Only the malformed member of the list is dropped
    let found = store
        .get(
            "people",
            json!([{"where": "city", "=": "Mushroom"}, {"where": "age"}]),
        )?
        .await?;
    assert_eq!(names(&found), vec!["Peach", "Toad"]);

    Ok(())
}

#[tokio::test]
async fn test_strict_mode_rejects_malformed_criteria() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory().strict_criteria(true)).await?;

    for criteria in [
        json!({"name": "Mario"}),
        json!({"where": "age"}),
        json!({"where": "age", ">": 1, "<": 9}),
        json!({"and": [{"where": "age", ">": 1}], "or": []}),
        json!(true),
    ] {
        assert!(
            matches!(
                store.get("people", criteria.clone()),
                Err(StoreError::InvalidArgument(_))
            ),
            "accepted {}",
            criteria
        );
    }

    // Well-formed criteria still work
    let found = store.get("people", json!({"where": "age", ">": 20}))?.await?;
    assert_eq!(names(&found), vec!["Mario", "Luigi"]);

    Ok(())
}

#[tokio::test]
async fn test_delete_uses_same_filter() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;

    let removed = store
        .delete("people", json!({"where": "city", "=": "Mushroom"}))?
        .await?;
    assert_eq!(removed, 2);
    assert_eq!(
        names(&store.get("people", Filter::all())?.await?),
        vec!["Mario", "Luigi", "Yoshi"]
    );

    Ok(())
}

#[tokio::test]
async fn test_undeclared_key_is_rejected() -> anyhow::Result<()> {
    let store = open_people(StoreConfig::in_memory()).await?;
    store
        .save("people", json!({"id": 6, "name": "Wario", "hat": "hat"}), None)?
        .await?;

    // `hat` lives only in the document, never as a column
    let found = store.get("people", json!({"where": "hat", "=": "hat"}))?.await;
    assert!(matches!(found, Err(StoreError::InvalidArgument(_))));

    let nested = json!({"where": "name", "=": "Wario", "or": [{"where": "hat", "!=": "cap"}]});
    assert!(matches!(
        store.get("people", nested)?.await,
        Err(StoreError::InvalidArgument(_))
    ));

    let removed = store.delete("people", json!({"where": "hat", "=": "hat"}))?.await;
    assert!(matches!(removed, Err(StoreError::InvalidArgument(_))));
    assert_eq!(store.get("people", Filter::all())?.await?.len(), 6);

    // Declared keys and the creation timestamp remain filterable
    let found = store
        .get("people", json!({"where": "__created", ">": "2000-01-01"}))?
        .await?;
    assert_eq!(found.len(), 6);

    Ok(())
}
