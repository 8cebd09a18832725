use anyhow::Result;
use async_trait::async_trait;
use sqlchat::errors::PromptError;
use sqlchat::providers::ai::AiProvider;
use sqlchat::providers::db::sqlite::SqliteProvider;
use sqlchat::types::{AiResponse, TokenUsage};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use turso::Database;

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub db: Database,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database and initializes the schema.
    pub async fn new() -> Result<Self> {
        let provider = SqliteProvider::new(":memory:").await?;
        provider.initialize_schema().await?;
        Ok(Self { db: provider.db })
    }
}

/// Directories for one ingestion test: where batches are staged and where stores go.
pub struct IngestDirs {
    pub root: TempDir,
    pub upload_dir: PathBuf,
    pub store_dir: PathBuf,
}

impl IngestDirs {
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let upload_dir = root.path().join("uploads");
        let store_dir = root.path().join("stores");
        Ok(Self {
            root,
            upload_dir,
            store_dir,
        })
    }

    /// Every file below `dir`, recursively. Missing directories count as empty.
    pub fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return files;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(Self::files_under(&path));
            } else {
                files.push(path);
            }
        }
        files
    }
}

// --- Fixtures ---

/// Creates a SQLite file at `path` and runs `init_sql` against it.
pub async fn create_store_file(path: &Path, init_sql: &str) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("fixture path is not valid UTF-8"))?;
    let provider = SqliteProvider::new(path_str).await?;
    provider.initialize_with_data(init_sql).await?;
    let conn = provider.db.connect()?;
    // Fold the WAL into the main file so the bytes can be read back as an upload.
    conn.query("PRAGMA wal_checkpoint(TRUNCATE);", ()).await?;
    Ok(())
}

/// Builds a SQLite file from `init_sql` and returns its bytes, as a client would upload them.
pub async fn store_file_bytes(init_sql: &str) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fixture.db");
    create_store_file(&path, init_sql).await?;
    Ok(std::fs::read(&path)?)
}

/// Counts the rows of `table` in the store at `path`.
pub async fn count_rows(path: &str, table: &str) -> Result<i64> {
    let provider = SqliteProvider::new(path).await?;
    let conn = provider.db.connect()?;
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM \"{table}\""), ())
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| anyhow::anyhow!("COUNT returned no row"))?;
    Ok(row.get::<i64>(0)?)
}

// --- Mock AI Provider ---

#[derive(Clone, Debug)]
pub struct MockAiProvider {
    responses: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    usage: TokenUsage,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            usage: TokenUsage::default(),
        }
    }

    /// Reports `usage` for every call.
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    /// Pre-programs a response for a specific prompt.
    /// The key should be a unique substring of the system prompt.
    ///
    /// Responses added under the same key are returned in order; the last one repeats.
    pub fn add_response(&self, key: &str, response: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry(key.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    /// Retrieves the recorded calls for assertion.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<AiResponse, PromptError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        let mut responses = self.responses.lock().unwrap();
        for (key, queue) in responses.iter_mut() {
            if system_prompt.contains(key.as_str()) {
                let text = if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                };
                return Ok(AiResponse {
                    text,
                    usage: self.usage,
                });
            }
        }

        Err(PromptError::AiApi(format!(
            "MockAiProvider: No response programmed for system prompt. Got: '{system_prompt}'"
        )))
    }
}
