//! # Query Agent Tests
//!
//! Exercises `QueryAgent` against a real store with a scripted AI provider: the
//! happy path, self-correction after a failing query, give-up behavior and timeouts.

mod common;

use crate::common::setup_tracing;
use async_trait::async_trait;
use sqlchat::agent::{AgentSettings, QueryAgent};
use sqlchat::providers::ai::AiProvider;
use sqlchat::providers::db::sqlite::SqliteProvider;
use sqlchat::types::{AiResponse, ModelConfig};
use sqlchat::PromptError;
use sqlchat_test_utils::MockAiProvider;
use std::time::Duration;

const QUERY_KEY: &str = "SQLite query writer";
const ANSWER_KEY: &str = "data analyst";

async fn sales_store() -> SqliteProvider {
    let store = SqliteProvider::new(":memory:").await.unwrap();
    store
        .initialize_with_data(
            "CREATE TABLE sales (id INTEGER, amount INTEGER);
             INSERT INTO sales VALUES (1, 100);
             INSERT INTO sales VALUES (2, 200);",
        )
        .await
        .unwrap();
    store
}

fn priced_model() -> ModelConfig {
    ModelConfig {
        provider: "mock".to_string(),
        prompt_cost_per_1k: 0.01,
        completion_cost_per_1k: 0.03,
    }
}

#[tokio::test]
async fn test_answer_runs_query_and_sums_cost() {
    setup_tracing();
    let store = sales_store().await;
    let mock = MockAiProvider::new().with_usage(1000, 100);
    mock.add_response(
        QUERY_KEY,
        "```sql\nSELECT SUM(amount) AS total FROM sales;\n```",
    );
    mock.add_response(ANSWER_KEY, "The total amount is 300.");
    let agent = QueryAgent::new(Box::new(mock.clone()), priced_model());

    let answer = agent
        .answer(&store, "what is the total amount")
        .await
        .unwrap();

    assert_eq!(
        answer.query.as_deref(),
        Some("SELECT SUM(amount) AS total FROM sales")
    );
    assert_eq!(answer.answer, "The total amount is 300.");
    // Two calls at 1000 prompt + 100 completion tokens each.
    assert!((answer.cost - 2.0 * (0.01 + 0.003)).abs() < 1e-9);

    let calls = mock.get_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.contains("Table: sales"));
    assert!(calls[1].1.contains(r#"[{"total":300}]"#));
}

#[tokio::test]
async fn test_failed_query_is_fed_back_and_retried() {
    setup_tracing();
    let store = sales_store().await;
    let mock = MockAiProvider::new();
    mock.add_response(QUERY_KEY, "```sql\nSELECT SUM(total) FROM orders\n```");
    mock.add_response(QUERY_KEY, "```sql\nSELECT SUM(amount) AS total FROM sales\n```");
    mock.add_response(ANSWER_KEY, "300");
    let agent = QueryAgent::new(Box::new(mock.clone()), ModelConfig::default());

    let answer = agent.answer(&store, "total?").await.unwrap();

    assert_eq!(
        answer.query.as_deref(),
        Some("SELECT SUM(amount) AS total FROM sales")
    );
    assert_eq!(answer.cost, 0.0);
    let calls = mock.get_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1].1.contains("# Previous Attempt"));
    assert!(calls[1].1.contains("SELECT SUM(total) FROM orders"));
}

#[tokio::test]
async fn test_agent_gives_up_after_max_attempts() {
    setup_tracing();
    let store = sales_store().await;
    let mock = MockAiProvider::new();
    mock.add_response(QUERY_KEY, "DROP TABLE sales");
    let agent = QueryAgent::new(Box::new(mock.clone()), ModelConfig::default()).with_settings(
        AgentSettings {
            max_attempts: 2,
            timeout: Duration::from_secs(5),
        },
    );

    let err = agent.answer(&store, "delete everything").await.unwrap_err();

    assert!(matches!(err, PromptError::AgentExhausted { attempts: 2, .. }));
    assert_eq!(mock.get_calls().len(), 2);
    // The store is untouched.
    assert_eq!(store.list_tables().await.unwrap(), vec!["sales".to_string()]);
}

#[derive(Clone, Debug)]
struct SlowProvider;

#[async_trait]
impl AiProvider for SlowProvider {
    async fn generate(&self, _: &str, _: &str) -> Result<AiResponse, PromptError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(AiResponse::default())
    }
}

#[tokio::test]
async fn test_model_calls_are_bounded_by_timeout() {
    setup_tracing();
    let store = sales_store().await;
    let agent = QueryAgent::new(Box::new(SlowProvider), ModelConfig::default()).with_settings(
        AgentSettings {
            max_attempts: 1,
            timeout: Duration::from_millis(50),
        },
    );

    let err = agent.answer(&store, "total?").await.unwrap_err();

    match err {
        PromptError::AgentExhausted { last_error, .. } => {
            assert!(last_error.contains("did not answer"), "{last_error}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
