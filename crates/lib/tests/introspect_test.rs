//! # Store Introspection Tests

mod common;

use crate::common::setup_tracing;
use sqlchat::describe_store;
use sqlchat::providers::db::sqlite::SqliteProvider;

#[tokio::test]
async fn test_describe_store_lists_tables_columns_and_rows() {
    setup_tracing();
    let store = SqliteProvider::new(":memory:").await.unwrap();
    store
        .initialize_with_data(
            "CREATE TABLE sales (id INTEGER, amount INTEGER);
             INSERT INTO sales VALUES (1, 100);
             INSERT INTO sales VALUES (2, 200);
             CREATE TABLE teams (name TEXT, founded INTEGER);
             INSERT INTO teams VALUES ('Ajax', NULL);",
        )
        .await
        .unwrap();

    let report = describe_store(&store).await.unwrap();

    assert_eq!(
        report,
        "Table: sales\nColumns: id, amount\nROW 1: (1, 100)\nROW 2: (2, 200)\n\n\
         Table: teams\nColumns: name, founded\nROW 1: ('Ajax', NULL)\n\n"
    );
}

#[tokio::test]
async fn test_describe_store_limits_sample_rows() {
    setup_tracing();
    let store = SqliteProvider::new(":memory:").await.unwrap();
    let mut init = String::from("CREATE TABLE n (v INTEGER);");
    for i in 1..=8 {
        init.push_str(&format!("INSERT INTO n VALUES ({i});"));
    }
    store.initialize_with_data(&init).await.unwrap();

    let report = describe_store(&store).await.unwrap();

    assert!(report.contains("ROW 5: (5)"));
    assert!(!report.contains("ROW 6"));
}

#[tokio::test]
async fn test_describe_empty_store() {
    setup_tracing();
    let store = SqliteProvider::new(":memory:").await.unwrap();
    assert_eq!(describe_store(&store).await.unwrap(), "");
}
