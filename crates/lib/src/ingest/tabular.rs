//! # CSV Import
//!
//! Parses an uploaded CSV file and writes it as one table, named after the file.
//! A table that already exists under the same canonical name is replaced.

use crate::ingest::{
    finish_transaction,
    traits::{Importer, IngestError},
    types::StagedFile,
};
use crate::sanitize::{is_reserved_identifier, quote_identifier, sanitize_identifier};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::{collections::HashSet, io::Read, path::Path};
use thiserror::Error;
use tracing::{debug, info};
use turso::{Connection, Value as TursoValue};

const DATETIME_FORMATS: [&str; 2] = ["%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Problems with the content of a CSV file.
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("the file has no header row")]
    MissingHeader,
    #[error("{0}")]
    Format(#[from] csv::Error),
    #[error("could not read the file: {0}")]
    Io(#[from] std::io::Error),
}

/// The SQL type chosen for a column after looking at all of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    DateTime,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Text => "TEXT",
        }
    }

    fn to_value(self, field: &str) -> TursoValue {
        if field.is_empty() {
            return TursoValue::Null;
        }
        match self {
            ColumnType::Integer => field
                .parse::<i64>()
                .map(TursoValue::Integer)
                .unwrap_or_else(|_| TursoValue::Text(field.to_string())),
            ColumnType::Real => field
                .parse::<f64>()
                .map(TursoValue::Real)
                .unwrap_or_else(|_| TursoValue::Text(field.to_string())),
            ColumnType::DateTime => {
                TursoValue::Text(normalize_datetime(field).unwrap_or_else(|| field.to_string()))
            }
            ColumnType::Text => TursoValue::Text(field.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: ColumnType,
}

/// A fully parsed CSV file, ready to be written.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<TursoValue>>,
}

/// Imports CSV uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularImporter;

#[async_trait]
impl Importer for TabularImporter {
    async fn import(
        &self,
        dest: &Connection,
        file: &StagedFile,
    ) -> Result<Vec<String>, IngestError> {
        let table_name = sanitize_identifier(file.stem());
        if table_name.is_empty() {
            return Err(IngestError::EmptyIdentifier(file.original_name.clone()));
        }
        if is_reserved_identifier(&table_name) {
            return Err(IngestError::ReservedIdentifier(
                file.original_name.clone(),
                table_name,
            ));
        }
        info!(
            "Importing CSV '{}' into table '{}'",
            file.original_name, table_name
        );

        let path = file.path.clone();
        let table = tokio::task::spawn_blocking(move || parse_csv_file(&path))
            .await
            .map_err(|e| IngestError::Internal(e.into()))?
            .map_err(|e| IngestError::Parse {
                file: file.original_name.clone(),
                reason: e.to_string(),
            })?;

        let row_count = write_table(dest, &table_name, table).await?;
        info!("Wrote {row_count} rows into '{table_name}'");
        Ok(vec![table_name])
    }
}

pub fn parse_csv_file(path: &Path) -> Result<ParsedTable, CsvError> {
    let file = std::fs::File::open(path)?;
    parse_csv(file)
}

/// Parses CSV content with a header row.
///
/// Every record must have as many fields as the header. Empty fields become NULL.
pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedTable, CsvError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(CsvError::MissingHeader);
    }
    let names = column_names(headers.iter());

    let mut records = Vec::new();
    for result in rdr.records() {
        records.push(result?);
    }

    let columns: Vec<ColumnDef> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| ColumnDef {
            name,
            sql_type: infer_column_type(records.iter().filter_map(|r| r.get(i))),
        })
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .zip(record.iter())
                .map(|(column, field)| column.sql_type.to_value(field))
                .collect()
        })
        .collect();

    Ok(ParsedTable { columns, rows })
}

/// Trims header names, names blank ones by position and suffixes repeats.
///
/// SQLite compares column names case-insensitively, so repeats are detected that way too.
fn column_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (i, raw) in headers.enumerate() {
        let trimmed = raw.trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", i + 1)
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.to_lowercase()) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        names.push(candidate);
    }
    names
}

fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut any = false;
    let mut integer = true;
    let mut real = true;
    let mut datetime = true;

    for value in values.filter(|v| !v.is_empty()) {
        any = true;
        if integer && value.parse::<i64>().is_err() {
            integer = false;
        }
        if real && !value.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            real = false;
        }
        if datetime && normalize_datetime(value).is_none() {
            datetime = false;
        }
        if !integer && !real && !datetime {
            break;
        }
    }

    match (any, integer, real, datetime) {
        (false, ..) => ColumnType::Text,
        (true, true, ..) => ColumnType::Integer,
        (true, false, true, _) => ColumnType::Real,
        (true, false, false, true) => ColumnType::DateTime,
        _ => ColumnType::Text,
    }
}

/// Rewrites recognized date and date-time values into ISO form.
fn normalize_datetime(value: &str) -> Option<String> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Replaces `table_name` with the parsed content inside one transaction.
async fn write_table(
    conn: &Connection,
    table_name: &str,
    table: ParsedTable,
) -> Result<usize, IngestError> {
    conn.execute("BEGIN TRANSACTION", ()).await?;
    let result = replace_table(conn, table_name, table).await;
    finish_transaction(conn, result).await
}

async fn replace_table(
    conn: &Connection,
    table_name: &str,
    table: ParsedTable,
) -> Result<usize, IngestError> {
    let quoted_table = quote_identifier(table_name);
    conn.execute(&format!("DROP TABLE IF EXISTS {quoted_table}"), ())
        .await?;

    let column_defs = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.sql_type.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let create_sql = format!("CREATE TABLE {quoted_table} ({column_defs})");
    debug!(sql = %create_sql, "Creating table");
    conn.execute(&create_sql, ()).await?;

    let column_list = table
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let insert_sql = format!("INSERT INTO {quoted_table} ({column_list}) VALUES ({placeholders})");
    let mut stmt = conn.prepare(&insert_sql).await?;

    let row_count = table.rows.len();
    for row in table.rows {
        stmt.execute(row).await?;
    }
    Ok(row_count)
}
