//! # SQLite Specific SQL Queries
//!
//! This module centralizes SQL query strings for the SQLite provider.
//! This makes the core logic cleaner and isolates database-specific syntax.

/// Application tables: users (with their store binding and API credential),
/// chats and the messages within them.
pub const CREATE_USERS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL DEFAULT 'user',
        store_path TEXT,
        api_key TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )";

pub const CREATE_CHATS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS chats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        title TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    )";

pub const CREATE_MESSAGES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        message TEXT NOT NULL,
        db_query TEXT,
        cost REAL NOT NULL DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    )";

/// Every statement needed to bring a fresh application database up to date, in order.
pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_CHATS_TABLE,
    CREATE_MESSAGES_TABLE,
];

/// Lists user tables in a store in their natural (creation) order.
///
/// Only the literal `sqlite_` prefix marks an internal table. `LIKE` is avoided since
/// it treats `_` as a wildcard and ignores case, which would hide tables such as
/// `SQLiteData`.
pub const LIST_USER_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type='table' AND substr(name, 1, 7) <> 'sqlite_'";
