//! # Prompt Template Modules
//!
//! This module organizes the prompt templates used by the query agent.
//! Shared query-writing rules live in `core`; the per-task defaults that the server
//! loads as its base configuration layer live in `tasks`.

pub mod core;
pub mod tasks;
