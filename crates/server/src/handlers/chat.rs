//! # Chat Handlers
//!
//! Chats hold a user's questions and the assistant's answers. Answering a question
//! runs the query agent against the caller's active store; agent failures become
//! the recorded answer instead of failing the request.

use super::{wrap_response, ApiResponse, AppError, AppState, DebugParams};
use crate::auth::middleware::AuthenticatedUser;
use axum::{
    extract::{Query, State},
    Json,
};
use core_access::{
    add_message, create_chat, get_chat, get_or_create_user, list_chats, list_messages, Chat,
    Message, NewMessage, User, ASSISTANT_USER_IDENTIFIER,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlchat::{
    constants::{CREDENTIAL_MISSING_MESSAGE, NO_STORE_MESSAGE},
    providers::db::sqlite::SqliteProvider,
    AgentAnswer, AgentCredentials, PromptError, QueryAgent,
};
use std::path::Path;
use tracing::{info, warn};

// --- API Payloads ---

#[derive(Deserialize, Debug, Default)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<Message>,
}

#[derive(Deserialize, Debug)]
pub struct AnswerRequest {
    pub chat_id: i64,
    pub message: String,
    /// Falls back to `default_model` when omitted.
    #[serde(default)]
    pub model_name: Option<String>,
}

// --- Handlers ---

/// Handles `POST /chats`.
pub async fn create_chat_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    Json(payload): Json<CreateChatRequest>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let chat = create_chat(&app_state.sqlite_provider.db, &user.0.id, title).await?;
    info!(user_id = %user.0.id, chat_id = chat.id, "Chat created.");
    Ok(wrap_response(chat, debug_params, None))
}

/// Handles `GET /chats`: the caller's chats, newest first, each with its messages.
pub async fn list_chats_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
) -> Result<Json<ApiResponse<Vec<ChatWithMessages>>>, AppError> {
    let db = &app_state.sqlite_provider.db;
    let mut result = Vec::new();
    for chat in list_chats(db, &user.0.id).await? {
        let messages = list_messages(db, chat.id).await?;
        result.push(ChatWithMessages { chat, messages });
    }
    Ok(wrap_response(result, debug_params, None))
}

/// Handles `POST /chats/answer`.
///
/// The question is stored before the agent runs, so it survives any agent failure.
/// The returned record is the assistant's answer.
pub async fn answer_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<Message>>, AppError> {
    let request: AnswerRequest = serde_json::from_value(payload)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?;
    let question = request.message.trim();
    if question.is_empty() {
        return Err(AppError::Validation("'message' must not be empty.".into()));
    }
    let model_name = request
        .model_name
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .or(app_state.config.default_model.as_deref())
        .ok_or_else(|| AppError::Validation("'model_name' is required.".into()))?
        .to_string();
    if !app_state.config.models.contains_key(&model_name) {
        return Err(PromptError::UnsupportedModel(model_name).into());
    }

    let db = &app_state.sqlite_provider.db;
    let user = user.0;
    let chat = get_chat(db, &user.id, request.chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chat {} was not found.", request.chat_id)))?;

    add_message(
        db,
        NewMessage {
            chat_id: chat.id,
            user_id: &user.id,
            message: question,
            db_query: None,
            cost: 0.0,
        },
    )
    .await?;

    let store_path = active_store_path(&app_state, &user);
    let answer = resolve_answer(&app_state, &user, store_path.as_deref(), &model_name, question).await;

    let assistant = get_or_create_user(db, ASSISTANT_USER_IDENTIFIER).await?;
    let saved = add_message(
        db,
        NewMessage {
            chat_id: chat.id,
            user_id: &assistant.id,
            message: &answer.answer,
            db_query: answer.query.as_deref(),
            cost: answer.cost,
        },
    )
    .await?;

    let debug_info = json!({
        "model_name": model_name,
        "store_path": store_path,
    });
    Ok(wrap_response(saved, debug_params, Some(debug_info)))
}

/// The store a user's questions run against: their own, or the configured default.
fn active_store_path(app_state: &AppState, user: &User) -> Option<String> {
    user.store_path
        .clone()
        .or_else(|| app_state.config.default_store_path.clone())
        .filter(|path| Path::new(path).exists())
}

fn fixed_answer(message: &str) -> AgentAnswer {
    AgentAnswer {
        query: None,
        answer: message.to_string(),
        cost: 0.0,
    }
}

async fn resolve_answer(
    app_state: &AppState,
    user: &User,
    store_path: Option<&str>,
    model_name: &str,
    question: &str,
) -> AgentAnswer {
    let Some(api_key) = user.api_key.as_deref().filter(|_| user.has_api_key()) else {
        info!(user_id = %user.id, "No API key configured; returning guidance.");
        return fixed_answer(CREDENTIAL_MISSING_MESSAGE);
    };
    let Some(store_path) = store_path else {
        info!(user_id = %user.id, "No store bound; returning guidance.");
        return fixed_answer(NO_STORE_MESSAGE);
    };

    let credentials = AgentCredentials::new(api_key.trim());
    match run_agent(app_state, store_path, model_name, &credentials, question).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Query agent failed.");
            AgentAnswer {
                query: None,
                answer: format!("Sorry, I could not answer that question. {e}"),
                cost: 0.0,
            }
        }
    }
}

async fn run_agent(
    app_state: &AppState,
    store_path: &str,
    model_name: &str,
    credentials: &AgentCredentials,
    question: &str,
) -> Result<AgentAnswer, PromptError> {
    let config = &app_state.config;
    let store = SqliteProvider::new(store_path).await?;
    let agent = QueryAgent::for_model(&config.providers, &config.models, model_name, credentials)?
        .with_prompts(app_state.prompts.as_ref().clone())
        .with_settings(app_state.agent_settings());
    agent.answer(&store, question).await
}
