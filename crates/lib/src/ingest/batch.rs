//! # Batch Ingestion
//!
//! Builds a brand-new store for every upload batch and only points the user at it
//! once every file has been imported. Until then the previous store stays active
//! and untouched, so a failure part-way through leaves nothing behind.

use crate::ingest::{
    merge::StoreMerger,
    tabular::TabularImporter,
    traits::{Importer, IngestError, StoreBindings},
    types::{base_name, BatchOutcome, StagedFile, UploadKind, UploadedFile},
};
use crate::sanitize::sanitize_identifier;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rejects a batch whose declared sizes add up to more than `max_bytes`.
///
/// Returns the total on success.
pub fn check_batch_size(files: &[UploadedFile], max_bytes: u64) -> Result<u64, IngestError> {
    let total: u64 = files.iter().map(UploadedFile::declared_size).sum();
    if total > max_bytes {
        return Err(IngestError::PayloadTooLarge {
            total,
            max: max_bytes,
        });
    }
    Ok(total)
}

/// Coordinates one upload batch from staging to the binding swap.
pub struct BatchIngestor<'a> {
    bindings: &'a dyn StoreBindings,
    upload_dir: PathBuf,
    store_dir: PathBuf,
    max_upload_bytes: u64,
}

impl<'a> BatchIngestor<'a> {
    pub fn new(
        bindings: &'a dyn StoreBindings,
        upload_dir: impl Into<PathBuf>,
        store_dir: impl Into<PathBuf>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            bindings,
            upload_dir: upload_dir.into(),
            store_dir: store_dir.into(),
            max_upload_bytes,
        }
    }

    /// Ingests `files` for `user_id` and makes the result the user's active store.
    ///
    /// CSV files are imported first, then SQLite files are merged, each group in
    /// submission order, so a merged table replaces a CSV table with the same name.
    /// Files with any other extension are skipped and reported.
    pub async fn ingest(
        &self,
        user_id: &str,
        files: Vec<UploadedFile>,
    ) -> Result<BatchOutcome, IngestError> {
        let total = check_batch_size(&files, self.max_upload_bytes)?;
        info!(
            "Ingesting {} file(s), {total} bytes, for user {user_id}",
            files.len()
        );

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix("batch-")
            .tempdir_in(&self.upload_dir)?;
        let (staged, ignored_files) = stage_files(staging.path(), files).await?;

        let user_dir = self.store_dir.join(user_directory_name(user_id));
        tokio::fs::create_dir_all(&user_dir).await?;
        let store_path = user_dir.join(format!("{}.db", Uuid::new_v4()));
        let store_path_str = store_path
            .to_str()
            .ok_or_else(|| {
                IngestError::Internal(anyhow::anyhow!(
                    "store path is not valid UTF-8: {}",
                    store_path.display()
                ))
            })?
            .to_string();
        let pending = PendingStore::new(store_path.clone());

        let tables = build_store(&store_path_str, &staged).await?;
        let previous_store_path = self.bindings.bind_store(user_id, &store_path_str).await?;
        pending.commit();
        info!("User {user_id} is now bound to store '{store_path_str}'");

        if let Some(previous) = previous_store_path.as_deref() {
            if previous != store_path_str {
                self.retire_store(previous);
            }
        }
        if let Err(e) = staging.close() {
            warn!("Failed to clean up the staging directory: {e}");
        }

        Ok(BatchOutcome {
            store_path: store_path_str,
            previous_store_path,
            tables,
            ignored_files,
        })
    }

    /// Deletes a store that is no longer bound, if this ingestor manages it.
    fn retire_store(&self, path: &str) {
        let path = Path::new(path);
        if !path.starts_with(&self.store_dir) {
            info!(
                "Previous store '{}' is outside the managed store directory; leaving it in place",
                path.display()
            );
            return;
        }
        match remove_store_files(path) {
            Ok(()) => info!("Removed previous store '{}'", path.display()),
            Err(e) => warn!("Failed to remove previous store '{}': {e}", path.display()),
        }
    }
}

/// Writes importable files to the staging directory and collects the names of the rest.
async fn stage_files(
    staging_dir: &Path,
    files: Vec<UploadedFile>,
) -> Result<(Vec<StagedFile>, Vec<String>), IngestError> {
    let mut staged = Vec::new();
    let mut ignored = Vec::new();
    for (index, file) in files.into_iter().enumerate() {
        let kind = UploadKind::from_file_name(&file.file_name);
        if kind == UploadKind::Unrecognized {
            warn!("Ignoring '{}': unsupported file type", file.file_name);
            ignored.push(file.file_name);
            continue;
        }
        let path = staging_dir.join(format!("{index:04}-{}", base_name(&file.file_name)));
        tokio::fs::write(&path, &file.content).await?;
        debug!("Staged '{}' at '{}'", file.file_name, path.display());
        staged.push(StagedFile {
            original_name: file.file_name,
            path,
            kind,
        });
    }
    Ok((staged, ignored))
}

fn importer_for(kind: UploadKind) -> Option<Box<dyn Importer>> {
    match kind {
        UploadKind::Tabular => Some(Box::new(TabularImporter)),
        UploadKind::Store => Some(Box::new(StoreMerger)),
        UploadKind::Unrecognized => None,
    }
}

/// Imports every staged file into a new store at `store_path`.
async fn build_store(store_path: &str, staged: &[StagedFile]) -> Result<Vec<String>, IngestError> {
    let db = turso::Builder::new_local(store_path).build().await?;
    let conn = db.connect()?;

    let mut tables: Vec<String> = Vec::new();
    for phase in [UploadKind::Tabular, UploadKind::Store] {
        for file in staged.iter().filter(|f| f.kind == phase) {
            let Some(importer) = importer_for(file.kind) else {
                continue;
            };
            for table in importer.import(&conn, file).await? {
                tables.retain(|t| t != &table);
                tables.push(table);
            }
        }
    }

    if let Err(e) = conn.query("PRAGMA wal_checkpoint(TRUNCATE);", ()).await {
        debug!("WAL checkpoint on new store skipped: {e}");
    }
    Ok(tables)
}

/// Removes a store file together with its WAL and shared-memory side files.
fn remove_store_files(path: &Path) -> std::io::Result<()> {
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        match std::fs::remove_file(&side) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn user_directory_name(user_id: &str) -> String {
    let name = sanitize_identifier(user_id);
    if name.is_empty() {
        "anonymous".to_string()
    } else {
        name
    }
}

/// A store that is being built. It is deleted on drop unless committed.
struct PendingStore {
    path: PathBuf,
    committed: bool,
}

impl PendingStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingStore {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = remove_store_files(&self.path) {
            warn!(
                "Failed to remove abandoned store '{}': {e}",
                self.path.display()
            );
        }
    }
}
