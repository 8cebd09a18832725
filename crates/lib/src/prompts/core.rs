//! # Shared Prompt Pieces
//!
//! Rules and helpers shared by the query generation templates.

/// Query-writing rules tailored to stores built from uploads.
pub const QUERY_CONSTRUCTION_RULES: &str = r#"# Query Construction Rules
1. Write exactly one read-only SQLite query. It MUST start with SELECT or WITH.
2. Table names in this database are lowercase, with spaces and punctuation replaced by underscores (e.g., a file named "Game Sales.csv" is the table `game_sales`). Column names keep their original spelling; wrap them in double quotes when they contain spaces or punctuation.
3. Use only tables and columns listed in the # Schema context. Do not use placeholders for table or column names.
4. For questions about "who", "what", or "list", use DISTINCT to avoid duplicate results.
5. For "top N", "highest" or "most" questions, use ORDER BY on the relevant metric in descending order and a LIMIT clause.
6. When filtering, explicitly exclude NULL values (e.g., `your_column IS NOT NULL`).
7. For keyword searches, use LIKE and check all plausible text columns.
8. **Crucially, do not format data in the query.** Return raw numbers and dates. Formatting is handled separately.
9. Return the query inside a ```sql fenced code block and nothing else."#;

/// Describes the failure of the previous attempt so the model can correct itself.
pub fn get_feedback_instruction(previous_error: Option<&str>) -> String {
    match previous_error {
        Some(error) if !error.trim().is_empty() => format!(
            "# Previous Attempt\nYour previous query failed with this error:\n{error}\nWrite a corrected query."
        ),
        _ => String::new(),
    }
}

/// Replaces each `{key}` placeholder in `template` with its value.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{key}}}"), value)
        })
}
