//! # Query Agent
//!
//! Answers a natural-language question about a user's store: it asks the model for a
//! read-only SQL query, runs it, feeds any failure back for another attempt, and
//! finally asks the model to phrase the answer from the returned rows.

use crate::errors::PromptError;
use crate::introspect::describe_store;
use crate::prompts::{
    core::{get_feedback_instruction, render_template, QUERY_CONSTRUCTION_RULES},
    tasks::{
        ANSWER_SYNTHESIS_SYSTEM_PROMPT, ANSWER_SYNTHESIS_USER_PROMPT,
        QUERY_GENERATION_SYSTEM_PROMPT, QUERY_GENERATION_USER_PROMPT,
    },
};
use crate::providers::{
    ai::AiProvider,
    db::sqlite::SqliteProvider,
    factory::create_dynamic_provider,
};
use crate::types::{AgentCredentials, AiResponse, ModelConfig, ProviderConfig};
use regex::Regex;
use serde::Serialize;
use std::{collections::HashMap, sync::LazyLock, time::Duration};
use tracing::{debug, info, warn};

/// Rows passed to the answer step are cut off after this many characters.
const MAX_RESULT_CHARS: usize = 20_000;

static FENCED_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:sql|sqlite|query)?\n?([\s\S]*?)```").expect("static fence pattern is valid")
});

static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create|attach|detach|pragma|vacuum|reindex)\b")
        .expect("static keyword pattern is valid")
});

/// String literals and quoted identifiers, which may legitimately contain keywords.
static QUOTED_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|`[^`]*`|\[[^\]]*\]"#)
        .expect("static quoting pattern is valid")
});

/// The outcome of one answered question.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentAnswer {
    /// The query that produced the answer, if one was run.
    pub query: Option<String>,
    pub answer: String,
    /// Estimated cost of every model call made for this answer, in USD.
    pub cost: f64,
}

/// Retry and timeout bounds for the agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub max_attempts: u32,
    /// Upper bound for every single model call.
    pub timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// The prompt templates the agent uses. Defaults come from [`crate::prompts::tasks`].
#[derive(Debug, Clone)]
pub struct AgentPrompts {
    pub query_system: String,
    pub query_user: String,
    pub answer_system: String,
    pub answer_user: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            query_system: QUERY_GENERATION_SYSTEM_PROMPT.to_string(),
            query_user: QUERY_GENERATION_USER_PROMPT.to_string(),
            answer_system: ANSWER_SYNTHESIS_SYSTEM_PROMPT.to_string(),
            answer_user: ANSWER_SYNTHESIS_USER_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryAgent {
    ai_provider: Box<dyn AiProvider>,
    model: ModelConfig,
    prompts: AgentPrompts,
    settings: AgentSettings,
}

impl QueryAgent {
    pub fn new(ai_provider: Box<dyn AiProvider>, model: ModelConfig) -> Self {
        Self {
            ai_provider,
            model,
            prompts: AgentPrompts::default(),
            settings: AgentSettings::default(),
        }
    }

    /// Builds an agent for `model_name` that authenticates with the caller's credentials.
    pub fn for_model(
        providers: &HashMap<String, ProviderConfig>,
        models: &HashMap<String, ModelConfig>,
        model_name: &str,
        credentials: &AgentCredentials,
    ) -> Result<Self, PromptError> {
        let (ai_provider, model) =
            create_dynamic_provider(providers, models, model_name, credentials)?;
        Ok(Self::new(ai_provider, model))
    }

    pub fn with_prompts(mut self, prompts: AgentPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Answers `question` from the data in `store`.
    pub async fn answer(
        &self,
        store: &SqliteProvider,
        question: &str,
    ) -> Result<AgentAnswer, PromptError> {
        let context = describe_store(store).await?;
        let max_attempts = self.settings.max_attempts.max(1);
        let mut cost = 0.0;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            info!("Query generation attempt {attempt}/{max_attempts}");
            let feedback = get_feedback_instruction(last_error.as_deref());
            let user_prompt = render_template(
                &self.prompts.query_user,
                &[
                    ("prompt", question),
                    ("context", &context),
                    ("rules", QUERY_CONSTRUCTION_RULES),
                    ("feedback", &feedback),
                ],
            );

            let response = match self.generate(&self.prompts.query_system, &user_prompt).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Query generation failed on attempt {attempt}: {e}");
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            cost += self.model.estimate_cost(&response.usage);

            let query = match extract_query(&response.text) {
                Ok(query) => query,
                Err(e) => {
                    warn!("Rejected generated query on attempt {attempt}: {e}");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match store.execute_query(&query).await {
                Ok(rows) => {
                    info!("Query succeeded on attempt {attempt}");
                    let (answer, answer_cost) = self.synthesize(question, &query, &rows).await?;
                    return Ok(AgentAnswer {
                        query: Some(query),
                        answer,
                        cost: cost + answer_cost,
                    });
                }
                Err(e) => {
                    warn!("Query failed on attempt {attempt}: {e}");
                    last_error = Some(format!("{e}\nQuery: {query}"));
                }
            }
        }

        Err(PromptError::AgentExhausted {
            attempts: max_attempts,
            last_error: last_error.unwrap_or_default(),
        })
    }

    async fn synthesize(
        &self,
        question: &str,
        query: &str,
        rows: &str,
    ) -> Result<(String, f64), PromptError> {
        let content = truncate_chars(rows, MAX_RESULT_CHARS);
        let user_prompt = render_template(
            &self.prompts.answer_user,
            &[("prompt", question), ("query", query), ("content", content)],
        );
        let response = self
            .generate(&self.prompts.answer_system, &user_prompt)
            .await?;
        let cost = self.model.estimate_cost(&response.usage);
        Ok((response.text.trim().to_string(), cost))
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<AiResponse, PromptError> {
        debug!(system_prompt = %system_prompt, user_prompt = %user_prompt, "--> Sending prompts to AI Provider");
        let response = tokio::time::timeout(
            self.settings.timeout,
            self.ai_provider.generate(system_prompt, user_prompt),
        )
        .await
        .map_err(|_| PromptError::AiTimeout(self.settings.timeout.as_secs()))??;
        debug!("<-- Response from AI: {}", response.text);
        Ok(response)
    }
}

/// Pulls the query out of a model response and checks that it only reads.
pub fn extract_query(raw_response: &str) -> Result<String, PromptError> {
    let query = FENCED_QUERY
        .captures(raw_response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw_response)
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_string();

    let upper = query.to_uppercase();
    let unquoted = QUOTED_TEXT.replace_all(&query, " ");
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH"))
        || WRITE_KEYWORD.is_match(&unquoted)
    {
        return Err(PromptError::NonReadOnlyQuery(query));
    }
    Ok(query)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_from_fenced_block() {
        let raw = "Here you go:\n```sql\nSELECT SUM(amount) FROM sales;\n```";
        assert_eq!(extract_query(raw).unwrap(), "SELECT SUM(amount) FROM sales");
    }

    #[test]
    fn test_extract_query_without_fence() {
        let raw = "  WITH t AS (SELECT 1 AS x) SELECT x FROM t  ";
        assert_eq!(
            extract_query(raw).unwrap(),
            "WITH t AS (SELECT 1 AS x) SELECT x FROM t"
        );
    }

    #[test]
    fn test_extract_query_rejects_writes() {
        assert!(matches!(
            extract_query("DELETE FROM sales"),
            Err(PromptError::NonReadOnlyQuery(_))
        ));
        assert!(matches!(
            extract_query("WITH x AS (SELECT 1) DELETE FROM sales"),
            Err(PromptError::NonReadOnlyQuery(_))
        ));
        assert!(matches!(
            extract_query("I cannot answer that."),
            Err(PromptError::NonReadOnlyQuery(_))
        ));
    }

    #[test]
    fn test_extract_query_allows_write_words_inside_identifiers() {
        let raw = "SELECT created_at, updated_by FROM audit_log";
        assert_eq!(extract_query(raw).unwrap(), raw);
    }

    #[test]
    fn test_extract_query_ignores_keywords_in_literals_and_quoted_names() {
        let raw = "SELECT COUNT(*) FROM orders WHERE status = 'delete' OR note = 'it''s an update'";
        assert_eq!(extract_query(raw).unwrap(), raw);
        let quoted = r#"SELECT "drop rate", [create date] FROM events"#;
        assert_eq!(extract_query(quoted).unwrap(), quoted);
        assert!(matches!(
            extract_query("SELECT 'x'; DROP TABLE sales"),
            Err(PromptError::NonReadOnlyQuery(_))
        ));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("日本語です", 2), "日本");
    }
}
