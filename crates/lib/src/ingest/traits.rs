use crate::ingest::types::StagedFile;
use async_trait::async_trait;
use thiserror::Error;
use turso::Connection;

/// Errors raised while turning an upload batch into a user store.
///
/// Every variant aborts the whole batch: the user's store binding only changes when
/// all files were processed successfully.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Upload of {total} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { total: u64, max: u64 },

    #[error("Failed to parse '{file}': {reason}")]
    Parse { file: String, reason: String },

    #[error("Failed to merge '{file}': {reason}")]
    Merge { file: String, reason: String },

    #[error("'{0}' does not yield a usable table name")]
    EmptyIdentifier(String),

    #[error("'{0}' maps to the reserved table name '{1}'")]
    ReservedIdentifier(String, String),

    #[error("Failed to update the store binding: {0}")]
    Binding(String),

    #[error("A database operation failed during ingestion: {0}")]
    Database(#[from] turso::Error),

    #[error("A file operation failed during ingestion: {0}")]
    Io(#[from] std::io::Error),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    /// True for failures caused by the uploaded content rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::PayloadTooLarge { .. }
                | IngestError::Parse { .. }
                | IngestError::Merge { .. }
                | IngestError::EmptyIdentifier(_)
                | IngestError::ReservedIdentifier(..)
        )
    }
}

/// Writes one staged upload into a destination store.
///
/// There is one implementation per importable [`UploadKind`](crate::ingest::UploadKind):
/// [`TabularImporter`](crate::ingest::TabularImporter) for CSV files and
/// [`StoreMerger`](crate::ingest::StoreMerger) for SQLite database files.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Imports `file` into the store behind `dest`.
    ///
    /// Returns the canonical names of the tables written, in the order they were
    /// written. Tables with the same canonical name are replaced, never appended to.
    async fn import(&self, dest: &Connection, file: &StagedFile)
        -> Result<Vec<String>, IngestError>;
}

/// The persistence collaborator that records which store is active for a user.
#[async_trait]
pub trait StoreBindings: Send + Sync {
    /// Returns the path of the user's active store, if any.
    async fn active_store(&self, user_id: &str) -> Result<Option<String>, IngestError>;

    /// Points the user at `store_path` in a single committed step and returns the
    /// path that was bound before.
    async fn bind_store(
        &self,
        user_id: &str,
        store_path: &str,
    ) -> Result<Option<String>, IngestError>;
}
