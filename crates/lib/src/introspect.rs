//! # Store Introspection
//!
//! Renders a compact, deterministic description of a user store (tables, columns
//! and a few sample rows) for use as context in model prompts.

use crate::constants::SAMPLE_ROW_LIMIT;
use crate::errors::PromptError;
use crate::providers::db::sqlite::{sql, SqliteProvider};
use crate::sanitize::quote_identifier;
use std::fmt::Write;
use tracing::debug;
use turso::{Connection, Value as TursoValue};

/// Describes every table of the store in its natural listing order.
///
/// ```text
/// Table: sales
/// Columns: id, amount
/// ROW 1: (1, 100)
/// ROW 2: (2, 200)
///
/// ```
pub async fn describe_store(store: &SqliteProvider) -> Result<String, PromptError> {
    let conn = store
        .db
        .connect()
        .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

    let mut tables = Vec::new();
    let mut rows = conn.query(sql::LIST_USER_TABLES, ()).await?;
    while let Some(row) = rows.next().await? {
        if let TursoValue::Text(name) = row.get_value(0)? {
            tables.push(name);
        }
    }

    let mut report = String::new();
    for table in &tables {
        describe_table(&conn, table, &mut report).await?;
    }
    debug!(
        "Described {} table(s) in {} bytes",
        tables.len(),
        report.len()
    );
    Ok(report)
}

async fn describe_table(
    conn: &Connection,
    table: &str,
    report: &mut String,
) -> Result<(), PromptError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT * FROM {} LIMIT {SAMPLE_ROW_LIMIT}",
            quote_identifier(table)
        ))
        .await?;
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    // Writing into a String cannot fail.
    let _ = writeln!(report, "Table: {table}");
    let _ = writeln!(report, "Columns: {}", columns.join(", "));

    let mut rows = stmt.query(()).await?;
    let mut index = 0;
    while let Some(row) = rows.next().await? {
        index += 1;
        let values = (0..columns.len())
            .map(|i| row.get_value(i).map(render_value))
            .collect::<Result<Vec<_>, _>>()?;
        let _ = writeln!(report, "ROW {index}: ({})", values.join(", "));
    }
    report.push('\n');
    Ok(())
}

fn render_value(value: TursoValue) -> String {
    match value {
        TursoValue::Null => "NULL".to_string(),
        TursoValue::Integer(i) => i.to_string(),
        TursoValue::Real(f) => format!("{f:?}"),
        TursoValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        TursoValue::Blob(_) => "<blob>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(TursoValue::Null), "NULL");
        assert_eq!(render_value(TursoValue::Integer(7)), "7");
        assert_eq!(render_value(TursoValue::Real(2.5)), "2.5");
        assert_eq!(render_value(TursoValue::Text("O'Neil".into())), "'O''Neil'");
        assert_eq!(render_value(TursoValue::Blob(vec![1, 2])), "<blob>");
    }
}
