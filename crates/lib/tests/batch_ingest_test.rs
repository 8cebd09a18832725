//! # Batch Ingestion Tests
//!
//! End-to-end tests of `BatchIngestor` with the application database acting as the
//! store binding. They cover processing order, the binding swap, cleanup of retired
//! and abandoned stores, and the size guard.

mod common;

use crate::common::setup_tracing;
use serde_json::json;
use sqlchat::ingest::{BatchIngestor, IngestError, StoreBindings, UploadedFile};
use sqlchat::providers::db::sqlite::SqliteProvider;
use sqlchat_test_utils::{count_rows, store_file_bytes, IngestDirs};
use std::path::Path;

const MAX_BYTES: u64 = 1024 * 1024;

async fn app_with_user() -> (SqliteProvider, String) {
    let app = SqliteProvider::new(":memory:").await.unwrap();
    app.initialize_schema().await.unwrap();
    let user = core_access::get_or_create_user(&app.db, "ingest@example.com")
        .await
        .unwrap();
    (app, user.id)
}

#[tokio::test]
async fn test_store_file_takes_precedence_over_csv() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, MAX_BYTES);
    let league = store_file_bytes(
        "CREATE TABLE teams (name TEXT, city TEXT);
         INSERT INTO teams VALUES ('Ajax', 'Amsterdam');",
    )
    .await
    .unwrap();

    // The database file is submitted first but is still applied after the CSV.
    let outcome = ingestor
        .ingest(
            &user_id,
            vec![
                UploadedFile::new("league.db", league),
                UploadedFile::new("teams.csv", "name\nCSV Club\nOther Club\n"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.tables, vec!["teams".to_string()]);
    assert!(outcome.previous_store_path.is_none());
    let store = SqliteProvider::new(&outcome.store_path).await.unwrap();
    let rows = store.execute_query("SELECT name, city FROM teams").await.unwrap();
    let rows: serde_json::Value = serde_json::from_str(&rows).unwrap();
    assert_eq!(rows, json!([{"name": "Ajax", "city": "Amsterdam"}]));

    let bound = app.active_store(&user_id).await.unwrap();
    assert_eq!(bound.as_deref(), Some(outcome.store_path.as_str()));
}

#[tokio::test]
async fn test_new_batch_replaces_and_removes_previous_store() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, MAX_BYTES);

    let first = ingestor
        .ingest(
            &user_id,
            vec![UploadedFile::new("sales.csv", "id,amount\n1,100\n2,200\n")],
        )
        .await
        .unwrap();
    let second = ingestor
        .ingest(
            &user_id,
            vec![UploadedFile::new("costs.csv", "id,amount\n1,5\n")],
        )
        .await
        .unwrap();

    assert_ne!(first.store_path, second.store_path);
    assert_eq!(
        second.previous_store_path.as_deref(),
        Some(first.store_path.as_str())
    );
    assert!(!Path::new(&first.store_path).exists());
    assert_eq!(count_rows(&second.store_path, "costs").await.unwrap(), 1);

    let store = SqliteProvider::new(&second.store_path).await.unwrap();
    assert_eq!(store.list_tables().await.unwrap(), vec!["costs".to_string()]);
}

#[tokio::test]
async fn test_failure_keeps_previous_binding_and_leaves_no_store() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, MAX_BYTES);
    let original = ingestor
        .ingest(
            &user_id,
            vec![UploadedFile::new("sales.csv", "id,amount\n1,100\n")],
        )
        .await
        .unwrap();

    let broken = store_file_bytes("CREATE TABLE \"???\" (x INTEGER);")
        .await
        .unwrap();
    let err = ingestor
        .ingest(
            &user_id,
            vec![
                UploadedFile::new("teams.csv", "name\nAjax\n"),
                UploadedFile::new("broken.db", broken),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Merge { ref file, .. } if file == "broken.db"));
    assert_eq!(
        app.active_store(&user_id).await.unwrap().as_deref(),
        Some(original.store_path.as_str())
    );
    assert_eq!(
        IngestDirs::files_under(&dirs.store_dir)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "db"))
            .collect::<Vec<_>>(),
        vec![std::path::PathBuf::from(&original.store_path)]
    );
    assert!(IngestDirs::files_under(&dirs.upload_dir).is_empty());
}

#[tokio::test]
async fn test_size_guard_rejects_before_writing_anything() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, 10);

    let err = ingestor
        .ingest(
            &user_id,
            vec![
                UploadedFile::new("a.csv", "id\n1\n2\n"),
                UploadedFile::new("b.csv", "id\n3\n4\n"),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::PayloadTooLarge { total: 14, max: 10 }
    ));
    assert!(!dirs.upload_dir.exists());
    assert!(!dirs.store_dir.exists());
    assert!(app.active_store(&user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unrecognized_files_are_ignored_and_empty_batch_binds_empty_store() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, MAX_BYTES);

    let outcome = ingestor
        .ingest(
            &user_id,
            vec![UploadedFile::new("notes.txt", "hello")],
        )
        .await
        .unwrap();

    assert!(outcome.tables.is_empty());
    assert_eq!(outcome.ignored_files, vec!["notes.txt".to_string()]);
    assert!(Path::new(&outcome.store_path).exists());
    assert_eq!(
        app.active_store(&user_id).await.unwrap().as_deref(),
        Some(outcome.store_path.as_str())
    );
}

#[tokio::test]
async fn test_previous_store_outside_store_dir_is_left_alone() {
    setup_tracing();
    let (app, user_id) = app_with_user().await;
    let dirs = IngestDirs::new().unwrap();
    let external = dirs.root.path().join("seed.db");
    sqlchat_test_utils::create_store_file(&external, "CREATE TABLE medals (country TEXT);")
        .await
        .unwrap();
    app.bind_store(&user_id, external.to_str().unwrap())
        .await
        .unwrap();
    let ingestor = BatchIngestor::new(&app, &dirs.upload_dir, &dirs.store_dir, MAX_BYTES);

    let outcome = ingestor
        .ingest(&user_id, vec![UploadedFile::new("sales.csv", "id\n1\n")])
        .await
        .unwrap();

    assert_eq!(
        outcome.previous_store_path.as_deref(),
        external.to_str()
    );
    assert!(external.exists());
}
