//! # Core Access Crate
//!
//! This crate is the central authority for user identity and per-user state in the
//! `sqlchat` application: which store a user is bound to, the model credential they
//! configured, and their chats and messages.

/// The identifier of the account that authors every assistant answer.
pub const ASSISTANT_USER_IDENTIFIER: &str = "::assistant::";

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use turso::{Connection, Database, Error as TursoError, Row, Value, params};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreAccessError {
    #[error("Database error: {0}")]
    Database(#[from] TursoError),
    #[error("Failed to create or find user for identifier: {0}")]
    UserPersistenceFailed(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

/// Represents a user in the system.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// The unique, deterministic ID of the user (UUIDv5 from an external identifier).
    pub id: String,
    /// The external identifier the user signed in with.
    pub username: String,
    /// The user's role ('user' or 'assistant').
    pub role: String,
    /// The user's active data store, if they have uploaded anything.
    pub store_path: Option<String>,
    /// The user's model provider API key.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// The timestamp when the user was first created.
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

const USER_COLUMNS: &str = "id, username, role, store_path, api_key, created_at";

impl TryFrom<&Row> for User {
    type Error = CoreAccessError;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            role: row.get(2)?,
            store_path: optional_text(row, 3)?,
            api_key: optional_text(row, 4)?,
            created_at: parse_timestamp(row, 5)?,
        })
    }
}

/// A conversation owned by one user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub id: i64,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Row> for Chat {
    type Error = CoreAccessError;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        Ok(Chat {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: optional_text(row, 2)?,
            created_at: parse_timestamp(row, 3)?,
        })
    }
}

/// One message in a chat: either a user's question or an assistant answer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: String,
    pub message: String,
    /// The SQL that produced an answer. Always `None` for questions.
    pub db_query: Option<String>,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Row> for Message {
    type Error = CoreAccessError;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        let cost = match row.get_value(5)? {
            Value::Real(f) => f,
            Value::Integer(i) => i as f64,
            _ => 0.0,
        };
        Ok(Message {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            user_id: row.get(2)?,
            message: row.get(3)?,
            db_query: optional_text(row, 4)?,
            cost,
            created_at: parse_timestamp(row, 6)?,
        })
    }
}

/// The fields of a message that is about to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub chat_id: i64,
    pub user_id: &'a str,
    pub message: &'a str,
    pub db_query: Option<&'a str>,
    pub cost: f64,
}

fn optional_text(row: &Row, index: usize) -> Result<Option<String>, CoreAccessError> {
    match row.get_value(index)? {
        Value::Text(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => Err(CoreAccessError::DataIntegrity(format!(
            "Expected text or NULL in column {index}, got {other:?}"
        ))),
    }
}

fn parse_timestamp(row: &Row, index: usize) -> Result<DateTime<Utc>, CoreAccessError> {
    let created_at_str: String = row.get(index)?;
    chrono::NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        .map_err(|e| {
            CoreAccessError::DataIntegrity(format!("Failed to parse date '{created_at_str}': {e}"))
        })
}

fn nullable_text(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// Derives the stable user ID for an external identifier.
pub fn user_id_for(user_identifier: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, user_identifier.as_bytes()).to_string()
}

async fn select_user(conn: &Connection, user_id: &str) -> Result<Option<User>, CoreAccessError> {
    let mut rows = conn
        .query(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            params![user_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(User::try_from(&row)?)),
        None => Ok(None),
    }
}

/// Finds a user by their unique identifier (e.g., email or token sub),
/// creating them if they don't exist.
///
/// This function creates a deterministic UUIDv5 from the identifier to use as
/// the primary key, ensuring idempotency.
pub async fn get_or_create_user(
    db: &Database,
    user_identifier: &str,
) -> Result<User, CoreAccessError> {
    let conn = db.connect()?;
    let user_id = user_id_for(user_identifier);

    if let Some(user) = select_user(&conn, &user_id).await? {
        return Ok(user);
    }

    let role = if user_identifier == ASSISTANT_USER_IDENTIFIER {
        "assistant"
    } else {
        "user"
    };
    conn.execute(
        "INSERT INTO users (id, username, role) VALUES (?, ?, ?)",
        params![user_id.clone(), user_identifier, role],
    )
    .await?;
    info!("Created {role} account for '{user_identifier}'");

    select_user(&conn, &user_id)
        .await?
        .ok_or_else(|| CoreAccessError::UserPersistenceFailed(user_identifier.to_string()))
}

pub async fn get_user(db: &Database, user_id: &str) -> Result<Option<User>, CoreAccessError> {
    let conn = db.connect()?;
    select_user(&conn, user_id).await
}

/// Returns the path of the store the user is bound to, if any.
pub async fn get_store_path(
    db: &Database,
    user_id: &str,
) -> Result<Option<String>, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query("SELECT store_path FROM users WHERE id = ?", params![user_id])
        .await?;
    match rows.next().await? {
        Some(row) => optional_text(&row, 0),
        None => Err(CoreAccessError::UserNotFound(user_id.to_string())),
    }
}

/// Binds the user to `store_path` and returns the previously bound path.
///
/// The read of the old value and the update happen in one transaction.
pub async fn swap_store_path(
    db: &Database,
    user_id: &str,
    store_path: &str,
) -> Result<Option<String>, CoreAccessError> {
    let conn = db.connect()?;
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let result = swap_store_path_in_transaction(&conn, user_id, store_path).await;
    match result {
        Ok(previous) => {
            conn.execute("COMMIT", ()).await?;
            Ok(previous)
        }
        Err(e) => {
            warn!("Rolling back store binding for user {user_id}: {e}");
            conn.execute("ROLLBACK", ()).await?;
            Err(e)
        }
    }
}

async fn swap_store_path_in_transaction(
    conn: &Connection,
    user_id: &str,
    store_path: &str,
) -> Result<Option<String>, CoreAccessError> {
    let previous = {
        let mut rows = conn
            .query("SELECT store_path FROM users WHERE id = ?", params![user_id])
            .await?;
        match rows.next().await? {
            Some(row) => optional_text(&row, 0)?,
            None => return Err(CoreAccessError::UserNotFound(user_id.to_string())),
        }
    };
    conn.execute(
        "UPDATE users SET store_path = ? WHERE id = ?",
        params![store_path, user_id],
    )
    .await?;
    Ok(previous)
}

/// Stores the user's model API key. `None` or a blank key clears it.
pub async fn set_api_key(
    db: &Database,
    user_id: &str,
    api_key: Option<&str>,
) -> Result<(), CoreAccessError> {
    let conn = db.connect()?;
    let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());
    let updated = conn
        .execute(
            "UPDATE users SET api_key = ? WHERE id = ?",
            vec![nullable_text(api_key), Value::Text(user_id.to_string())],
        )
        .await?;
    if updated == 0 {
        return Err(CoreAccessError::UserNotFound(user_id.to_string()));
    }
    Ok(())
}

pub async fn create_chat(
    db: &Database,
    user_id: &str,
    title: Option<&str>,
) -> Result<Chat, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "INSERT INTO chats (user_id, title) VALUES (?, ?) RETURNING id, user_id, title, created_at",
            vec![Value::Text(user_id.to_string()), nullable_text(title)],
        )
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| CoreAccessError::DataIntegrity("Chat insert returned no row".into()))?;
    Chat::try_from(&row)
}

/// Returns the chat if it exists and belongs to `user_id`.
pub async fn get_chat(
    db: &Database,
    user_id: &str,
    chat_id: i64,
) -> Result<Option<Chat>, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT id, user_id, title, created_at FROM chats WHERE id = ? AND user_id = ?",
            params![chat_id, user_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(Chat::try_from(&row)?)),
        None => Ok(None),
    }
}

/// Lists the user's chats, newest first.
pub async fn list_chats(db: &Database, user_id: &str) -> Result<Vec<Chat>, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT id, user_id, title, created_at FROM chats WHERE user_id = ? ORDER BY id DESC",
            params![user_id],
        )
        .await?;
    let mut chats = Vec::new();
    while let Some(row) = rows.next().await? {
        chats.push(Chat::try_from(&row)?);
    }
    Ok(chats)
}

pub async fn add_message(
    db: &Database,
    new_message: NewMessage<'_>,
) -> Result<Message, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "INSERT INTO messages (chat_id, user_id, message, db_query, cost) VALUES (?, ?, ?, ?, ?) \
             RETURNING id, chat_id, user_id, message, db_query, cost, created_at",
            vec![
                Value::Integer(new_message.chat_id),
                Value::Text(new_message.user_id.to_string()),
                Value::Text(new_message.message.to_string()),
                nullable_text(new_message.db_query),
                Value::Real(new_message.cost),
            ],
        )
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| CoreAccessError::DataIntegrity("Message insert returned no row".into()))?;
    Message::try_from(&row)
}

/// Lists the messages of a chat in the order they were written.
pub async fn list_messages(db: &Database, chat_id: i64) -> Result<Vec<Message>, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT id, chat_id, user_id, message, db_query, cost, created_at FROM messages WHERE chat_id = ? ORDER BY id",
            params![chat_id],
        )
        .await?;
    let mut messages = Vec::new();
    while let Some(row) = rows.next().await? {
        messages.push(Message::try_from(&row)?);
    }
    Ok(messages)
}
