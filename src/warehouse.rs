use std::fs;

use camino::Utf8Path;
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;

use crate::domain::TableId;
use crate::error::EtlError;
use crate::schema::{Column, ColumnType, TableSchema, generate_create_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteDisposition {
    /// Replace table contents (and schema) with the loaded rows.
    Truncate,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadOptions {
    pub skip_leading_rows: usize,
    pub write_disposition: WriteDisposition,
    pub create_disposition: CreateDisposition,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            skip_leading_rows: 1,
            write_disposition: WriteDisposition::Truncate,
            create_disposition: CreateDisposition::CreateIfNeeded,
        }
    }
}

/// Destination analytical store.
pub trait Warehouse {
    fn table_exists(&self, table: &TableId) -> Result<bool, EtlError>;
    fn create_table(&self, table: &TableId, schema: &TableSchema) -> Result<(), EtlError>;
    /// Delete every row; returns how many were removed.
    fn delete_all(&self, table: &TableId) -> Result<u64, EtlError>;
    fn row_count(&self, table: &TableId) -> Result<u64, EtlError>;
    /// Bulk load CSV content; returns the number of rows written.
    fn load_csv(
        &self,
        table: &TableId,
        schema: &TableSchema,
        content: &[u8],
        options: &LoadOptions,
    ) -> Result<u64, EtlError>;
}

pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    pub fn open(path: &Utf8Path) -> Result<Self, EtlError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| EtlError::Filesystem(err.to_string()))?;
            }
        }
        let conn = Connection::open(path.as_std_path()).map_err(table_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(table_err)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, EtlError> {
        let conn = Connection::open_in_memory().map_err(table_err)?;
        Ok(Self { conn })
    }

    /// All rows of `table` as loaded values, ordered by the first column.
    pub fn select_all(&self, table: &TableId) -> Result<Vec<Vec<SqlValue>>, EtlError> {
        self.require_table(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY 1", table.quoted()))
            .map_err(table_err)?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get::<_, SqlValue>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(table_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(table_err)?;
        Ok(rows)
    }

    fn require_table(&self, table: &TableId) -> Result<(), EtlError> {
        if !self.table_exists(table)? {
            return Err(EtlError::TableNotFound(table.to_string()));
        }
        Ok(())
    }
}

impl Warehouse for SqliteWarehouse {
    fn table_exists(&self, table: &TableId) -> Result<bool, EtlError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table.as_str()],
                |row| row.get(0),
            )
            .map_err(table_err)?;
        Ok(count > 0)
    }

    fn create_table(&self, table: &TableId, schema: &TableSchema) -> Result<(), EtlError> {
        self.conn
            .execute(&generate_create_table(table, schema, true), [])
            .map_err(table_err)?;
        Ok(())
    }

    fn delete_all(&self, table: &TableId) -> Result<u64, EtlError> {
        self.require_table(table)?;
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM {}", table.quoted()), [])
            .map_err(table_err)?;
        Ok(deleted as u64)
    }

    fn row_count(&self, table: &TableId) -> Result<u64, EtlError> {
        self.require_table(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |row| {
                row.get(0)
            })
            .map_err(table_err)?;
        Ok(count as u64)
    }

    fn load_csv(
        &self,
        table: &TableId,
        schema: &TableSchema,
        content: &[u8],
        options: &LoadOptions,
    ) -> Result<u64, EtlError> {
        let rows = parse_rows(schema, content, options.skip_leading_rows)?;

        let exists = self.table_exists(table)?;
        if !exists && options.create_disposition == CreateDisposition::CreateNever {
            return Err(EtlError::TableNotFound(table.to_string()));
        }

        // Dropped on error, which rolls back the truncate as well.
        let tx = self.conn.unchecked_transaction().map_err(table_err)?;
        if options.write_disposition == WriteDisposition::Truncate {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", table.quoted()), [])
                .map_err(table_err)?;
        }
        tx.execute(&generate_create_table(table, schema, true), [])
            .map_err(table_err)?;

        let columns = schema
            .columns
            .iter()
            .map(|col| format!("\"{}\"", col.name))
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        );

        {
            let mut stmt = tx.prepare_cached(&insert_sql).map_err(table_err)?;
            for row in &rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))
                    .map_err(table_err)?;
            }
        }
        tx.commit().map_err(table_err)?;

        Ok(rows.len() as u64)
    }
}

/// Parse and type-check CSV content against `schema`. The first skipped row, when
/// there is one, must name the schema columns in order.
pub fn parse_rows(
    schema: &TableSchema,
    content: &[u8],
    skip_leading_rows: usize,
) -> Result<Vec<Vec<SqlValue>>, EtlError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 1;
        let record = record.map_err(|err| EtlError::Csv(format!("line {line}: {err}")))?;

        if index < skip_leading_rows {
            if index == 0 {
                check_header(schema, &record)?;
            }
            continue;
        }

        if record.len() != schema.columns.len() {
            return Err(EtlError::MalformedRow {
                row: line,
                column: "*".to_string(),
                reason: format!(
                    "expected {} fields, found {}",
                    schema.columns.len(),
                    record.len()
                ),
            });
        }

        let values = schema
            .columns
            .iter()
            .zip(record.iter())
            .map(|(col, raw)| {
                convert_cell(col, raw).map_err(|reason| EtlError::MalformedRow {
                    row: line,
                    column: col.name.to_string(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }
    Ok(rows)
}

fn check_header(schema: &TableSchema, header: &csv::StringRecord) -> Result<(), EtlError> {
    for name in header.iter() {
        if schema.find(name).is_none() {
            return Err(EtlError::SchemaMismatch(format!(
                "column `{name}` is not in the table schema"
            )));
        }
    }
    let expected = schema.column_names();
    let found = header.iter().collect::<Vec<_>>();
    if found != expected {
        return Err(EtlError::SchemaMismatch(format!(
            "header {found:?} does not match schema columns {expected:?}"
        )));
    }
    Ok(())
}

fn convert_cell(col: &Column, raw: &str) -> Result<SqlValue, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        if col.is_required() {
            return Err("missing value for REQUIRED column".to_string());
        }
        return Ok(SqlValue::Null);
    }
    match col.col_type {
        ColumnType::Int64 => raw
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|_| format!("`{raw}` is not an INT64")),
        ColumnType::Float64 => raw
            .parse::<f64>()
            .map(SqlValue::Real)
            .map_err(|_| format!("`{raw}` is not a FLOAT64")),
        ColumnType::Bool => parse_bool(raw)
            .map(|value| SqlValue::Integer(i64::from(value)))
            .ok_or_else(|| format!("`{raw}` is not a BOOL")),
        ColumnType::String => Ok(SqlValue::Text(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn table_err(err: rusqlite::Error) -> EtlError {
    EtlError::Table(err.to_string())
}
