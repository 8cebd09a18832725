//! # SQLite Merge
//!
//! Copies every user table of an uploaded SQLite file into the destination store,
//! renaming each table to its canonical form. Tables already present under the same
//! canonical name are replaced. The statement that creates each copy is rebuilt from
//! the source's column metadata rather than by editing its original DDL text.

use crate::ingest::{
    finish_transaction,
    traits::{Importer, IngestError},
    types::StagedFile,
};
use crate::providers::db::sqlite::sql;
use crate::sanitize::{is_reserved_identifier, quote_identifier, sanitize_identifier};
use async_trait::async_trait;
use regex::Regex;
use std::{path::Path, sync::LazyLock};
use tracing::{debug, info};
use turso::{Connection, Value as TursoValue};

static LITERAL_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:[-+]?[0-9]+(?:\.[0-9]+)?|'(?:[^']|'')*'|NULL|TRUE|FALSE|CURRENT_TIME|CURRENT_DATE|CURRENT_TIMESTAMP|\(.*\))$",
    )
    .expect("static default pattern is valid")
});

/// Merges uploaded SQLite files.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreMerger;

#[derive(Debug, Clone)]
struct SourceColumn {
    name: String,
    decl_type: String,
    not_null: bool,
    default: Option<String>,
    pk_position: i64,
}

#[derive(Debug, Clone)]
struct SourceTable {
    name: String,
    canonical: String,
    columns: Vec<SourceColumn>,
}

#[async_trait]
impl Importer for StoreMerger {
    async fn import(
        &self,
        dest: &Connection,
        file: &StagedFile,
    ) -> Result<Vec<String>, IngestError> {
        info!("Merging tables from '{}'", file.original_name);
        merge_file(dest, &file.path)
            .await
            .map_err(|e| match e {
                IngestError::Merge { .. } => e,
                other => IngestError::Merge {
                    file: file.original_name.clone(),
                    reason: other.to_string(),
                },
            })
    }
}

/// The source handle lives only for the duration of this call.
async fn merge_file(dest: &Connection, source_path: &Path) -> Result<Vec<String>, IngestError> {
    let source_path = source_path.to_str().ok_or_else(|| {
        IngestError::Internal(anyhow::anyhow!(
            "staged path is not valid UTF-8: {}",
            source_path.display()
        ))
    })?;
    let source_db = turso::Builder::new_local(source_path).build().await?;
    let source = source_db.connect()?;

    let tables = read_source_tables(&source).await?;
    if tables.is_empty() {
        info!("No user tables found in '{source_path}'");
        return Ok(Vec::new());
    }

    dest.execute("BEGIN TRANSACTION", ()).await?;
    let result = copy_tables(&source, dest, &tables).await;
    finish_transaction(dest, result).await
}

/// Lists the source's user tables with their column metadata.
///
/// Fails before anything is written if a table name has no usable canonical form
/// or maps onto a name SQLite reserves.
async fn read_source_tables(source: &Connection) -> Result<Vec<SourceTable>, IngestError> {
    let mut names = Vec::new();
    let mut rows = source.query(sql::LIST_USER_TABLES, ()).await?;
    while let Some(row) = rows.next().await? {
        if let TursoValue::Text(name) = row.get_value(0)? {
            names.push(name);
        }
    }

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let canonical = sanitize_identifier(&name);
        if canonical.is_empty() {
            return Err(IngestError::EmptyIdentifier(name));
        }
        if is_reserved_identifier(&canonical) {
            return Err(IngestError::ReservedIdentifier(name, canonical));
        }
        let columns = read_columns(source, &name).await?;
        tables.push(SourceTable {
            name,
            canonical,
            columns,
        });
    }
    Ok(tables)
}

async fn read_columns(source: &Connection, table: &str) -> Result<Vec<SourceColumn>, IngestError> {
    let mut rows = source
        .query(&format!("PRAGMA table_info({})", quote_identifier(table)), ())
        .await?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        let name = match row.get_value(1)? {
            TursoValue::Text(name) => name,
            other => {
                return Err(IngestError::Internal(anyhow::anyhow!(
                    "unexpected column name {other:?} in table '{table}'"
                )))
            }
        };
        let decl_type = match row.get_value(2)? {
            TursoValue::Text(t) => t,
            _ => String::new(),
        };
        let not_null = matches!(row.get_value(3)?, TursoValue::Integer(n) if n != 0);
        let default = match row.get_value(4)? {
            TursoValue::Text(d) => Some(d),
            TursoValue::Integer(i) => Some(i.to_string()),
            TursoValue::Real(f) => Some(f.to_string()),
            _ => None,
        };
        let pk_position = match row.get_value(5)? {
            TursoValue::Integer(n) => n,
            _ => 0,
        };
        columns.push(SourceColumn {
            name,
            decl_type,
            not_null,
            default,
            pk_position,
        });
    }
    Ok(columns)
}

/// Builds the `CREATE TABLE` statement for the canonical copy of `table`.
fn create_table_sql(table: &SourceTable) -> String {
    let mut pk_columns: Vec<&SourceColumn> = table
        .columns
        .iter()
        .filter(|c| c.pk_position > 0)
        .collect();
    pk_columns.sort_by_key(|c| c.pk_position);
    let single_pk = (pk_columns.len() == 1).then(|| pk_columns[0].name.as_str());

    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut def = quote_identifier(&c.name);
            if !c.decl_type.is_empty() {
                def.push(' ');
                def.push_str(&c.decl_type);
            }
            if single_pk == Some(c.name.as_str()) {
                def.push_str(" PRIMARY KEY");
            }
            if c.not_null {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &c.default {
                def.push_str(" DEFAULT ");
                def.push_str(&default_expression(default));
            }
            def
        })
        .collect();

    if pk_columns.len() > 1 {
        let keys = pk_columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        defs.push(format!("PRIMARY KEY ({keys})"));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(&table.canonical),
        defs.join(", ")
    )
}

/// Literal defaults are kept as-is, anything else is parenthesized.
fn default_expression(default: &str) -> String {
    if LITERAL_DEFAULT.is_match(default) {
        default.to_string()
    } else {
        format!("({default})")
    }
}

async fn copy_tables(
    source: &Connection,
    dest: &Connection,
    tables: &[SourceTable],
) -> Result<Vec<String>, IngestError> {
    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        if table_exists(dest, &table.canonical).await? {
            info!("Replacing existing table '{}'", table.canonical);
        }
        let quoted = quote_identifier(&table.canonical);
        dest.execute(&format!("DROP TABLE IF EXISTS {quoted}"), ())
            .await?;

        let create_sql = create_table_sql(table);
        debug!(sql = %create_sql, "Creating merged table");
        dest.execute(&create_sql, ()).await?;

        let copied = copy_rows(source, dest, table).await?;
        info!(
            "Copied {copied} rows from '{}' into '{}'",
            table.name, table.canonical
        );
        written.push(table.canonical.clone());
    }
    Ok(written)
}

async fn table_exists(conn: &Connection, name: &str) -> Result<bool, IngestError> {
    let mut rows = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?",
            turso::params![name],
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

async fn copy_rows(
    source: &Connection,
    dest: &Connection,
    table: &SourceTable,
) -> Result<usize, IngestError> {
    let column_list = table
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.columns.len()].join(", ");

    let mut insert = dest
        .prepare(&format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(&table.canonical)
        ))
        .await?;
    let mut rows = source
        .query(
            &format!(
                "SELECT {column_list} FROM {}",
                quote_identifier(&table.name)
            ),
            (),
        )
        .await?;

    let mut count = 0;
    while let Some(row) = rows.next().await? {
        let values = (0..table.columns.len())
            .map(|i| row.get_value(i))
            .collect::<Result<Vec<TursoValue>, _>>()?;
        insert.execute(values).await?;
        count += 1;
    }
    Ok(count)
}
