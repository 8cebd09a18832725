//! # Application Configuration
//!
//! This module defines the configuration structure for the `sqlchat-server` and
//! provides the logic for loading it from a `config.yml` file and environment
//! variables.

use config::{
    Config as ConfigBuilder, Environment, File, FileFormat, Value as ConfigValue,
    ValueKind as ConfigValueKind,
};
use regex::Regex;
use serde::Deserialize;
use sqlchat::constants::{
    DEFAULT_DB_FILE, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_STORE_DIR, DEFAULT_UPLOAD_DIR,
};
use sqlchat::prompts::tasks::DEFAULT_TASKS;
use sqlchat::{ModelConfig, ProviderConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::sync::LazyLock;
use tracing::info;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}").expect("static placeholder pattern is valid")
});

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The path to the application SQLite database. Loaded from `DB_URL` env var.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Where upload batches are staged while they are processed.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Where per-user stores are created.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    /// The ceiling for the combined size of one upload batch, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// A store to answer from for users who have not uploaded anything yet.
    #[serde(default)]
    pub default_store_path: Option<String>,
    #[serde(default)]
    pub agent: AgentConfig,
    /// A map of named, reusable OpenAI-compatible endpoints.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// The recognized model identifiers, keyed by the name requests use.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    /// The model used when a question does not name one.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Prompt templates, keyed by task name.
    pub tasks: HashMap<String, TaskConfig>,
}

fn default_port() -> u16 {
    9090
}

fn default_db_url() -> String {
    DEFAULT_DB_FILE.to_string()
}

fn default_upload_dir() -> String {
    DEFAULT_UPLOAD_DIR.to_string()
}

fn default_store_dir() -> String {
    DEFAULT_STORE_DIR.to_string()
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

/// Retry and timeout bounds for the query agent.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound for a single model call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

/// The prompts of one task.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaskConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// Constructs a `config::Value` map of the default tasks from the library.
/// This serves as the base layer of configuration.
fn build_default_tasks() -> HashMap<String, ConfigValue> {
    DEFAULT_TASKS
        .iter()
        .map(|(name, sys, user)| {
            let mut table = HashMap::new();
            table.insert("system_prompt".to_string(), ConfigValue::from(*sys));
            table.insert("user_prompt".to_string(), ConfigValue::from(*user));
            (
                name.to_string(),
                ConfigValue::new(None, ConfigValueKind::Table(table)),
            )
        })
        .collect()
}

// Reads a file and substitutes `${VAR}` placeholders from the environment.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let expanded_content = ENV_PLACEHOLDER.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// - Top-level keys like `port` and `db_url` are overridden by `PORT` and `DB_URL`.
/// - Nested keys are overridden by `SQLCHAT_...` variables (e.g. `SQLCHAT_AGENT__MAX_ATTEMPTS`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults from the library.
        .set_default("tasks", build_default_tasks())?;

    // Layer 2: Main config, with a provider template as fallback.
    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let provider = env::var("AI_PROVIDER").unwrap_or_else(|_| "openai".to_string());
            let fallback_path = format!("{base_path}/config.{provider}.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}' based on AI_PROVIDER='{provider}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?.ok_or_else(|| {
        ConfigError::NotFound(format!(
            "Main config file not found at '{main_config_path}'. Please ensure 'config.yml' exists or set AI_PROVIDER to a shipped template ('openai' or 'local')."
        ))
    })?;
    builder = builder.add_source(File::from_str(&main_content, FileFormat::Yaml));

    // Layer 3: Prompt overrides (optional).
    let user_prompt_path = format!("{base_path}/prompt.yml");
    if let Some(user_prompts_content) = read_and_substitute(&user_prompt_path)? {
        info!("Loading user prompt overrides from '{user_prompt_path}'.");
        builder = builder.add_source(File::from_str(&user_prompts_content, FileFormat::Yaml));
    }

    let settings = builder
        // Layer 4: Environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 5: Prefixed environment variables for deeper overrides.
        .add_source(
            Environment::with_prefix("SQLCHAT")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;

    if let Some(model) = &config.default_model {
        if !config.models.contains_key(model) {
            return Err(ConfigError::General(format!(
                "default_model '{model}' is not listed under 'models'."
            )));
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tasks_cover_every_library_task() {
        let tasks = build_default_tasks();
        for (name, _, _) in DEFAULT_TASKS {
            assert!(tasks.contains_key(*name), "missing task {name}");
        }
    }

    #[test]
    fn test_agent_config_defaults() {
        let agent = AgentConfig::default();
        assert_eq!(agent.max_attempts, 3);
        assert_eq!(agent.timeout_secs, 60);
    }
}
