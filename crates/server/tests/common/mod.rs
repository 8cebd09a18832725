//! # Common Test Utilities
//!
//! This module centralizes the test harness used across the `sqlchat-server`
//! integration tests:
//!
//! - `TestApp`: spawns a real server on a random port with its own temporary data
//!   directory, and points the configured model provider at an `httpmock::MockServer`.
//! - Helpers for issuing tokens, uploading files and scripting model completions.

// Not every test file uses every helper.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use httpmock::{prelude::*, Mock};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde_json::{json, Value};
use sqlchat_server::{
    auth::middleware::{jwt_secret, Claims},
    config, router,
    state::{build_app_state, AppState},
};
use std::{
    fs::File,
    io::Write,
    net::SocketAddr,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

/// The model every test app recognizes.
pub const TEST_MODEL: &str = "mock-model";
/// A substring of the query-generation system prompt.
pub const QUERY_PROMPT_MARKER: &str = "SQLite query writer";
/// A substring of the answer-synthesis system prompt.
pub const ANSWER_PROMPT_MARKER: &str = "data analyst";
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    pub data_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the application server with a 1 MiB upload limit.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_max_upload(1024 * 1024).await
    }

    pub async fn spawn_with_max_upload(max_upload_bytes: u64) -> Result<Self> {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let mock_server = MockServer::start_async().await;
        let data_dir = tempdir()?;
        let root = data_dir.path();
        let config_path = root.join("config.yml");
        let config_content = format!(
            r#"
port: 0
db_url: "{db}"
upload_dir: "{uploads}"
store_dir: "{stores}"
max_upload_bytes: {max_upload_bytes}
agent:
  max_attempts: 2
  timeout_secs: 5
providers:
  mock:
    api_url: "{api}"
models:
  {TEST_MODEL}:
    provider: "mock"
    prompt_cost_per_1k: 0.01
    completion_cost_per_1k: 0.03
default_model: "{TEST_MODEL}"
"#,
            db = root.join("app.db").display(),
            uploads = root.join("uploads").display(),
            stores = root.join("stores").display(),
            api = mock_server.url(COMPLETIONS_PATH),
        );
        let mut file = File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config = config::get_config(config_path.to_str())?;
        let app_state = build_app_state(config).await?;
        let app_state_for_harness = app_state.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(app_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state: app_state_for_harness,
            data_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub fn store_dir(&self) -> PathBuf {
        PathBuf::from(&self.app_state.config.store_dir)
    }

    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(&self.app_state.config.upload_dir)
    }

    /// Posts `files` as `files` parts of one multipart request.
    pub async fn upload(&self, token: &str, files: Vec<(&str, Vec<u8>)>) -> Result<Response> {
        let mut form = Form::new();
        for (name, content) in files {
            form = form.part("files", Part::bytes(content).file_name(name.to_string()));
        }
        Ok(self
            .client
            .post(self.url("/upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?)
    }

    pub async fn create_chat(&self, token: &str) -> Result<i64> {
        let response = self
            .client
            .post(self.url("/chats"))
            .bearer_auth(token)
            .json(&json!({ "title": "Test chat" }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "create chat failed");
        let body: Value = response.json().await?;
        body["result"]["id"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("chat id missing in {body}"))
    }

    pub async fn set_api_key(&self, token: &str, api_key: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url("/me/api_key"))
            .bearer_auth(token)
            .json(&json!({ "api_key": api_key }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "set api key failed");
        Ok(())
    }

    pub async fn ask(&self, token: &str, chat_id: i64, message: &str) -> Result<Response> {
        Ok(self
            .client
            .post(self.url("/chats/answer"))
            .bearer_auth(token)
            .json(&json!({ "chat_id": chat_id, "message": message, "model_name": TEST_MODEL }))
            .send()
            .await?)
    }

    /// Answers every completion request whose body contains `marker` with `content`.
    pub async fn mock_completion(&self, marker: &str, content: &str) -> Mock<'_> {
        let body = completion_body(content);
        self.mock_server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(COMPLETIONS_PATH)
                    .body_contains(marker);
                then.status(200).json_body(body);
            })
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// An OpenAI-style completion reporting 1000 prompt and 100 completion tokens.
pub fn completion_body(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 1000, "completion_tokens": 100, "total_tokens": 1100 }
    })
}

/// Generates a valid JWT for a given user identifier (subject).
pub fn generate_jwt(sub: &str) -> Result<String> {
    generate_jwt_with_expiry(sub, 3600)
}

/// Generates a JWT whose expiry is `expires_in_secs` from now; negative values
/// produce an already expired token.
pub fn generate_jwt_with_expiry(sub: &str, expires_in_secs: i64) -> Result<String> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let claims = Claims {
        sub: sub.to_string(),
        exp: (now + expires_in_secs) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_ref()),
    )?;
    Ok(token)
}
