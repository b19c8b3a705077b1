//! Query execution
//!
//! Runs SQL against whichever backend is connected and turns the rows into
//! backend-independent JSON cells, plus a plain-text table rendering that is
//! handed back to the model.

use crate::database::connection::DatabasePool;
use crate::database::safety::ensure_read_only;
use crate::error::{ChatDbError, Result};
use comfy_table::presets::ASCII_MARKDOWN;
use comfy_table::Table;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

/// Cell values longer than this are truncated in the text rendering
pub const MAX_CELL_CHARS: usize = 100;

/// Rows returned by a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Column names, in select order
    pub columns: Vec<String>,
    /// Row values, one `Vec` per row
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// True when the query returned no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the first column rendered as strings
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first())
            .map(cell_text)
            .collect()
    }

    /// Render as a text table
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "No rows returned.".to_string();
        }

        let mut table = Table::new();
        table.load_preset(ASCII_MARKDOWN);
        table.set_header(self.columns.clone());
        for row in &self.rows {
            table.add_row(row.iter().map(|v| truncate(&cell_text(v), MAX_CELL_CHARS)));
        }
        table.to_string()
    }
}

/// Display form of a single cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

impl DatabasePool {
    /// Run a query after checking that it cannot modify data
    pub async fn run_query(&self, sql: &str) -> Result<QueryOutput> {
        ensure_read_only(sql, self.backend())?;
        self.fetch(sql).await
    }

    /// Run a query without the read-only check
    ///
    /// Only used for statements built inside the crate.
    pub(crate) async fn fetch(&self, sql: &str) -> Result<QueryOutput> {
        debug!("Executing SQL: {}", sql);

        let output = match self {
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::raw_sql(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| ChatDbError::db_query(sql, e))?;
                collect(&rows, sqlite_cell)
            }
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::raw_sql(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| ChatDbError::db_query(sql, e))?;
                collect(&rows, postgres_cell)
            }
            DatabasePool::MySql(pool) => {
                let rows = sqlx::raw_sql(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| ChatDbError::db_query(sql, e))?;
                collect(&rows, mysql_cell)
            }
        };

        debug!("Query returned {} row(s)", output.rows.len());
        Ok(output)
    }
}

fn collect<R: Row>(rows: &[R], cell: fn(&R, usize) -> Value) -> QueryOutput {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| cell(row, idx)).collect())
        .collect();

    QueryOutput { columns, rows }
}

// Queries without bind parameters go over the text protocol, so every
// PostgreSQL and MySQL value arrives as its textual form.

fn postgres_cell(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_string();
    let text = row.try_get_unchecked::<Option<String>, _>(idx).ok().flatten();
    text_cell(text, &type_name)
}

fn mysql_cell(row: &MySqlRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_string();
    let text = row.try_get_unchecked::<Option<String>, _>(idx).ok().flatten();
    text_cell(text, &type_name)
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> Value {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|bytes| Value::String(format!("<{} bytes>", bytes.len())))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn text_cell(text: Option<String>, type_name: &str) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    let upper = type_name.to_ascii_uppercase();
    if upper == "BOOL" || upper == "BOOLEAN" {
        match text.as_str() {
            "t" | "true" | "1" => return Value::Bool(true),
            "f" | "false" | "0" => return Value::Bool(false),
            _ => {}
        }
    } else if upper.contains("INT") {
        if let Ok(n) = text.parse::<i64>() {
            return Value::from(n);
        }
    } else if upper.starts_with("FLOAT") || upper == "DOUBLE" || upper == "REAL" {
        if let Ok(f) = text.parse::<f64>() {
            return Value::from(f);
        }
    }

    Value::String(text)
}
