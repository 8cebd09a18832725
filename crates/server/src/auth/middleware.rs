//! # Authentication Middleware
//!
//! This module provides the `AuthenticatedUser` extractor. Tokens are issued by an
//! external identity provider; the server only validates them and maps the subject
//! to a user record, creating it on first sight.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use core_access::{get_or_create_user, User, ASSISTANT_USER_IDENTIFIER};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// The secret used when `JWT_SECRET` is not set.
const DEFAULT_JWT_SECRET: &str = "a-secure-secret-key";

/// Represents the claims we expect to find in the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The subject of the token, which we use as the unique user identifier.
    pub sub: String,
    /// The expiration timestamp.
    pub exp: usize,
}

/// Returns the secret tokens are signed with.
pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string())
}

/// An Axum extractor that provides the currently authenticated user.
///
/// Every route that uses it requires `Authorization: Bearer <token>`; a missing,
/// invalid or expired token is rejected with `401 Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// A custom rejection type for authentication failures.
pub struct AuthError(StatusCode, String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

fn unauthorized(message: &str) -> AuthError {
    AuthError(StatusCode::UNAUTHORIZED, message.to_string())
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    debug!("Missing or malformed Authorization header: {}", e);
                    unauthorized("A bearer token is required.")
                })?;

        // `Validation::default()` checks `exp`.
        let token_data = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(jwt_secret().as_ref()),
            &Validation::default(),
        )
        .map_err(|e| {
            warn!("JWT validation failed: {}", e);
            unauthorized("Invalid or expired token.")
        })?;

        let subject = token_data.claims.sub.trim();
        if subject.is_empty() || subject == ASSISTANT_USER_IDENTIFIER {
            warn!("Rejected token with reserved or empty subject.");
            return Err(unauthorized("Invalid or expired token."));
        }

        let user = get_or_create_user(&state.sqlite_provider.db, subject)
            .await
            .map_err(|e| {
                error!("Failed to get or create user: {}", e);
                AuthError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Could not retrieve user: {e}"),
                )
            })?;

        Ok(AuthenticatedUser(user))
    }
}
