//! # Shared Constants
//!
//! This module provides a centralized location for constants that are shared across
//! multiple crates in the `sqlchat` workspace. Using these constants helps to avoid
//! "magic strings" and ensures consistency.

/// The root directory for all local databases.
pub const DB_DIR: &str = "db";

/// The default path for the main application SQLite database.
pub const DEFAULT_DB_FILE: &str = "db/sqlchat.db";

/// The default directory under which upload batches are staged.
pub const DEFAULT_UPLOAD_DIR: &str = "db/uploads";

/// The default directory that holds the per-user stores built from uploads.
pub const DEFAULT_STORE_DIR: &str = "db/stores";

/// The default ceiling for the combined size of one upload batch (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// How many sample rows the schema summary shows per table.
pub const SAMPLE_ROW_LIMIT: usize = 5;

/// The answer recorded when the user has not configured a model API key.
pub const CREDENTIAL_MISSING_MESSAGE: &str = "No API key is configured for your account. Add your model provider API key in your profile settings, then ask your question again.";

/// The answer recorded when the user has not uploaded any data yet.
pub const NO_STORE_MESSAGE: &str =
    "You have not uploaded any data yet. Upload a CSV or database file, then ask your question again.";
