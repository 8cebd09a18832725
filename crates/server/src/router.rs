use super::{handlers, state::AppState};
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

/// Multipart framing overhead allowed on top of the configured batch size.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    // The handler enforces the exact limit and answers 413 itself; this bound only
    // stops the body from being buffered without end.
    let upload_body_limit = app_state
        .config
        .max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let upload_body_limit = usize::try_from(upload_body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route(
            "/upload",
            post(handlers::upload_handler).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route(
            "/chats",
            get(handlers::list_chats_handler).post(handlers::create_chat_handler),
        )
        .route("/chats/answer", post(handlers::answer_handler))
        .route("/me", get(handlers::get_me_handler))
        .route("/me/api_key", put(handlers::set_api_key_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
