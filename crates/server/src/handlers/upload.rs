//! # Upload Handler
//!
//! Accepts a multipart batch of CSV and SQLite files and turns it into the caller's
//! new active store.

use super::{wrap_response, ApiResponse, AppError, AppState, DebugParams};
use crate::auth::middleware::AuthenticatedUser;
use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::Multipart;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlchat::{BatchIngestor, IngestError, UploadedFile};
use tracing::{debug, info};

/// The multipart field every uploaded file is sent under.
pub const FILES_FIELD: &str = "files";

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub message: String,
    /// The tables of the new store, in the order they were written.
    pub tables: Vec<String>,
    /// Files skipped because their type is not supported.
    pub ignored_files: Vec<String>,
}

/// Handles `POST /upload`.
///
/// The running size of the batch is checked while the parts are read, so an
/// oversized batch is rejected before anything is written to disk.
pub async fn upload_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, AppError> {
    let config = &app_state.config;
    let max = config.max_upload_bytes;
    let mut files = Vec::new();
    let mut total: u64 = 0;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Every uploaded file needs a file name.".into()))?;
        let content = field.bytes().await?;
        total += content.len() as u64;
        if total > max {
            return Err(IngestError::PayloadTooLarge { total, max }.into());
        }
        files.push(UploadedFile::new(file_name, content.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError::Validation(format!(
            "No files were uploaded. Send one or more '{FILES_FIELD}' parts."
        )));
    }
    info!(
        user_id = %user.0.id,
        files = files.len(),
        bytes = total,
        "Upload batch received."
    );

    let ingestor = BatchIngestor::new(
        &*app_state.sqlite_provider,
        &config.upload_dir,
        &config.store_dir,
        max,
    );
    let outcome = ingestor.ingest(&user.0.id, files).await?;

    let debug_info = json!({
        "store_path": outcome.store_path,
        "previous_store_path": outcome.previous_store_path,
    });
    let response = UploadResponse {
        message: format!(
            "Upload processed. {} table(s) are ready to query.",
            outcome.tables.len()
        ),
        tables: outcome.tables,
        ignored_files: outcome.ignored_files,
    };
    Ok(wrap_response(response, debug_params, Some(debug_info)))
}
