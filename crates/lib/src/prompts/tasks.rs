//! # Default Task Prompts
//!
//! This module contains the default, hardcoded prompt templates for the agent's tasks.
//! These are loaded programmatically and can be overridden by `config.yml`.

/// The task key for turning a question into SQL.
pub const QUERY_GENERATION_TASK: &str = "query_generation";
/// The task key for phrasing the final answer from query results.
pub const ANSWER_SYNTHESIS_TASK: &str = "answer_synthesis";

// --- Query Generation ---
/// Placeholders: none.
pub const QUERY_GENERATION_SYSTEM_PROMPT: &str = r#"You are a SQLite query writer for a user's uploaded data. Given the database schema and a question, write a single read-only SQLite query that retrieves the data needed to answer it. Expected output is a single SQLite query only."#;

/// Placeholders: `{prompt}`, `{context}`, `{rules}`, `{feedback}`.
pub const QUERY_GENERATION_USER_PROMPT: &str = r#"# User question
{prompt}

# Schema
{context}

{rules}

{feedback}"#;

// --- Answer Synthesis ---
/// Placeholders: none.
pub const ANSWER_SYNTHESIS_SYSTEM_PROMPT: &str = "You are a data analyst who explains query results. Answer the user's #PROMPT using only the #INPUT rows returned by the #QUERY. You MUST NOT use external knowledge. If the #INPUT is empty or `[]`, say that no matching data was found. Keep the answer short and state numbers exactly as they appear.";

/// Placeholders: `{prompt}`, `{query}`, `{content}`.
pub const ANSWER_SYNTHESIS_USER_PROMPT: &str = r#"# PROMPT:
{prompt}

# QUERY:
{query}

# INPUT:
{content}
"#;

/// Every task with its default system and user prompt, in a stable order.
pub const DEFAULT_TASKS: &[(&str, &str, &str)] = &[
    (
        QUERY_GENERATION_TASK,
        QUERY_GENERATION_SYSTEM_PROMPT,
        QUERY_GENERATION_USER_PROMPT,
    ),
    (
        ANSWER_SYNTHESIS_TASK,
        ANSWER_SYNTHESIS_SYSTEM_PROMPT,
        ANSWER_SYNTHESIS_USER_PROMPT,
    ),
];
