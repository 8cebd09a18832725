//! # Upload Ingestion
//!
//! Turns a batch of uploaded files into a fresh SQLite store and swaps the user's
//! binding over to it. CSV files become one table each; SQLite files have their
//! tables merged in. Nothing the user can see changes unless the whole batch succeeds.

pub mod batch;
pub mod merge;
pub mod tabular;
pub mod traits;
pub mod types;

pub use batch::{check_batch_size, BatchIngestor};
pub use merge::StoreMerger;
pub use tabular::TabularImporter;
pub use traits::{Importer, IngestError, StoreBindings};
pub use types::{BatchOutcome, StagedFile, UploadKind, UploadedFile};

use tracing::warn;
use turso::Connection;

/// Commits the transaction opened on `conn` when `result` is `Ok`, rolls it back otherwise.
pub(crate) async fn finish_transaction<T>(
    conn: &Connection,
    result: Result<T, IngestError>,
) -> Result<T, IngestError> {
    match result {
        Ok(value) => {
            conn.execute("COMMIT", ()).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute("ROLLBACK", ()).await {
                warn!("Failed to roll back ingestion transaction: {rollback_err}");
            }
            Err(e)
        }
    }
}
