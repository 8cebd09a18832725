use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::multipart::MultipartError;
use core_access::CoreAccessError;
use serde_json::json;
use sqlchat::{IngestError, PromptError};
use tracing::{error, warn};

/// A custom error type for the server application.
///
/// This enum encapsulates different kinds of errors that can occur within the server,
/// allowing them to be converted into appropriate HTTP responses.
pub enum AppError {
    /// Errors originating from the AI providers or a user's store.
    Prompt(PromptError),
    /// Errors raised while ingesting an upload batch.
    Ingest(IngestError),
    /// Errors from the user, chat and message records.
    Access(CoreAccessError),
    /// A malformed multipart body.
    Multipart(MultipartError),
    /// Malformed or missing request fields.
    Validation(String),
    NotFound(String),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<PromptError> for AppError {
    fn from(err: PromptError) -> Self {
        AppError::Prompt(err)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::Ingest(err)
    }
}

impl From<CoreAccessError> for AppError {
    fn from(err: CoreAccessError) -> Self {
        AppError::Access(err)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Prompt(err) => {
                error!("PromptError: {:?}", err);
                match &err {
                    PromptError::UnsupportedModel(model) => (
                        StatusCode::BAD_REQUEST,
                        format!("Unsupported model: {model}"),
                    ),
                    PromptError::MissingAiProvider(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Server is not configured correctly.".to_string(),
                    ),
                    PromptError::AiRequest(_)
                    | PromptError::AiDeserialization(_)
                    | PromptError::AiApi(_)
                    | PromptError::AiTimeout(_) => (
                        StatusCode::BAD_GATEWAY,
                        format!("AI provider error: {err}"),
                    ),
                    other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
                }
            }
            AppError::Ingest(err) => {
                if err.is_client_error() {
                    warn!("Upload rejected: {err}");
                } else {
                    error!("IngestError: {:?}", err);
                }
                let status = match &err {
                    IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ if err.is_client_error() => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = if status.is_server_error() {
                    "The upload could not be processed.".to_string()
                } else {
                    err.to_string()
                };
                (status, message)
            }
            AppError::Access(err) => {
                error!("CoreAccessError: {:?}", err);
                match &err {
                    CoreAccessError::UserNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal server error occurred.".to_string(),
                    ),
                }
            }
            AppError::Multipart(err) => {
                warn!("Multipart error: {}", err);
                (err.status(), err.body_text())
            }
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
