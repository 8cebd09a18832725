use serde::Serialize;
use std::path::{Path, PathBuf};

/// How an uploaded file is routed, resolved once from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// A CSV file, imported as one table.
    Tabular,
    /// A SQLite database file, whose tables are merged in.
    Store,
    /// Anything else. Ignored.
    Unrecognized,
}

impl UploadKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = Path::new(base_name(file_name))
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => UploadKind::Tabular,
            Some("db") | Some("sqlite") | Some("sqlite3") => UploadKind::Store,
            _ => UploadKind::Unrecognized,
        }
    }
}

/// One file of an upload batch, as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub fn declared_size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// An uploaded file written to the batch's staging directory.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// The name the client gave the file. Table names derive from it.
    pub original_name: String,
    /// Where the content was staged.
    pub path: PathBuf,
    pub kind: UploadKind,
}

impl StagedFile {
    /// The client's file name without directories or extension.
    pub fn stem(&self) -> &str {
        let base = base_name(&self.original_name);
        Path::new(base)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(base)
    }
}

/// The result of a successfully committed upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// The new active store.
    pub store_path: String,
    /// The store that was active before this batch, if any.
    pub previous_store_path: Option<String>,
    /// Canonical names of the tables in the new store, in the order they were last written.
    pub tables: Vec<String>,
    /// Files that were skipped because their type is not recognized.
    pub ignored_files: Vec<String>,
}

/// Strips any client-side directory part from an uploaded file name.
pub fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
}
