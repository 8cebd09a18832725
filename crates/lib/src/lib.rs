//! # Ask Your Data
//!
//! This crate turns uploaded tabular data (CSV files and SQLite database files)
//! into one queryable SQLite store per user, and answers natural-language questions
//! about that store by asking a language model for SQL.
//!
//! The ingestion engine lives in [`ingest`]; the question-answering adapter lives in
//! [`agent`]. Both are independent of any HTTP surface so that the `server` crate
//! (or any other consumer) can drive them directly.

pub mod agent;
pub mod constants;
pub mod errors;
pub mod ingest;
pub mod introspect;
pub mod prompts;
pub mod providers;
pub mod sanitize;
pub mod types;

pub use agent::{AgentAnswer, AgentPrompts, AgentSettings, QueryAgent};
pub use errors::PromptError;
pub use ingest::{BatchIngestor, BatchOutcome, IngestError, UploadedFile};
pub use introspect::describe_store;
pub use sanitize::{is_reserved_identifier, quote_identifier, sanitize_identifier};
pub use types::{AgentCredentials, ModelConfig, ProviderConfig};
