//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the configuration, the
//! resolved prompt templates and the application database, making them
//! accessible to all request handlers.

use crate::config::AppConfig;
use sqlchat::{
    prompts::tasks::{ANSWER_SYNTHESIS_TASK, QUERY_GENERATION_TASK},
    providers::db::sqlite::SqliteProvider,
    AgentPrompts, AgentSettings,
};
use std::{sync::Arc, time::Duration};

/// The shared application state, accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// The prompt templates the query agent runs with.
    pub prompts: Arc<AgentPrompts>,
    /// The application database: users, store bindings, chats and messages.
    pub sqlite_provider: Arc<SqliteProvider>,
}

impl AppState {
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_attempts: self.config.agent.max_attempts,
            timeout: Duration::from_secs(self.config.agent.timeout_secs),
        }
    }
}

/// Returns the `(system, user)` prompts of a resolved task.
fn resolve_task(config: &AppConfig, name: &str) -> anyhow::Result<(String, String)> {
    let task = config
        .tasks
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Task '{name}' is not configured"))?;
    let system_prompt = task.system_prompt.clone().ok_or_else(|| {
        anyhow::anyhow!("Resolved task '{name}' is missing required 'system_prompt' field")
    })?;
    let user_prompt = task.user_prompt.clone().ok_or_else(|| {
        anyhow::anyhow!("Resolved task '{name}' is missing required 'user_prompt' field")
    })?;
    Ok((system_prompt, user_prompt))
}

/// Builds the shared application state from the configuration.
///
/// The prompt templates are resolved once here, and the application database
/// schema is created if it does not exist yet.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let (query_system, query_user) = resolve_task(&config, QUERY_GENERATION_TASK)?;
    let (answer_system, answer_user) = resolve_task(&config, ANSWER_SYNTHESIS_TASK)?;
    let prompts = AgentPrompts {
        query_system,
        query_user,
        answer_system,
        answer_user,
    };

    if let Some(parent) = std::path::Path::new(&config.db_url).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let sqlite_provider = SqliteProvider::new(&config.db_url).await?;
    tracing::info!(db_path = %config.db_url, "Initialized application database (SQLite).");
    sqlite_provider.initialize_schema().await?;

    Ok(AppState {
        config: Arc::new(config),
        prompts: Arc::new(prompts),
        sqlite_provider: Arc::new(sqlite_provider),
    })
}
