#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared helpers for the library tests: tracing setup and small builders for
//! staged files and temporary stores.

use dotenvy::dotenv;
use sqlchat::ingest::{StagedFile, UploadKind};
use sqlchat::providers::db::sqlite::SqliteProvider;
use std::path::Path;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Writes `content` into `dir` and describes it the way the batch ingestor would.
pub fn stage(dir: &Path, original_name: &str, content: &[u8]) -> StagedFile {
    let path = dir.join(original_name.replace(['/', '\\'], "_"));
    std::fs::write(&path, content).expect("failed to stage test file");
    StagedFile {
        original_name: original_name.to_string(),
        path,
        kind: UploadKind::from_file_name(original_name),
    }
}

/// Opens (or creates) a store file inside `dir`.
pub async fn open_store(dir: &Path, name: &str) -> SqliteProvider {
    let path = dir.join(name);
    SqliteProvider::new(path.to_str().expect("temp path is UTF-8"))
        .await
        .expect("failed to open store")
}
