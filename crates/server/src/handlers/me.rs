use super::{wrap_response, ApiResponse, AppError, AppState, DebugParams};
use crate::auth::middleware::AuthenticatedUser;
use axum::{
    extract::{Query, State},
    Json,
};
use core_access::{get_user, set_api_key, CoreAccessError, User};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The caller's profile. The API key itself is never returned.
#[derive(Serialize, Debug)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub has_api_key: bool,
}

impl From<User> for MeResponse {
    fn from(user: User) -> Self {
        let has_api_key = user.has_api_key();
        Self { user, has_api_key }
    }
}

#[derive(Deserialize, Debug)]
pub struct SetApiKeyRequest {
    /// A blank or missing key clears the stored one.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Returns the details of the currently authenticated user.
pub async fn get_me_handler(
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    Ok(wrap_response(MeResponse::from(user.0), debug_params, None))
}

/// Stores the model API key the caller's questions are answered with.
pub async fn set_api_key_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    Json(payload): Json<SetApiKeyRequest>,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    let db = &app_state.sqlite_provider.db;
    set_api_key(db, &user.0.id, payload.api_key.as_deref()).await?;
    let updated = get_user(db, &user.0.id)
        .await?
        .ok_or_else(|| CoreAccessError::UserNotFound(user.0.id.clone()))?;
    info!(user_id = %updated.id, has_api_key = updated.has_api_key(), "API key updated.");
    Ok(wrap_response(MeResponse::from(updated), debug_params, None))
}
