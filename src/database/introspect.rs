//! Schema introspection
//!
//! Lists tables and produces CREATE TABLE style descriptions with a few
//! sample rows, queried from each backend's system catalogs.

use crate::database::connection::{DatabaseBackend, DatabasePool};
use crate::database::query::cell_text;
use crate::error::{ChatDbError, Result};
use std::fmt::Write;

/// A column as reported by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared data type
    pub data_type: String,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Default value expression
    pub default_value: Option<String>,
    /// Part of the primary key
    pub is_primary_key: bool,
}

/// Quote a string literal
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl DatabasePool {
    /// List user tables and views, sorted by name
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = match self.backend() {
            DatabaseBackend::PostgreSQL => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() ORDER BY table_name"
            }
            DatabaseBackend::MySQL => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            DatabaseBackend::SQLite => {
                "SELECT name FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
        };

        Ok(self.fetch(sql).await?.first_column())
    }

    /// Columns of a single table, in ordinal order
    pub async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        match self.backend() {
            DatabaseBackend::SQLite => {
                let sql = format!("PRAGMA table_info({})", literal(table));
                let output = self.fetch(&sql).await?;

                // cid, name, type, notnull, dflt_value, pk
                Ok(output
                    .rows
                    .iter()
                    .map(|row| ColumnInfo {
                        name: cell_text(&row[1]),
                        data_type: cell_text(&row[2]),
                        nullable: row[3].as_i64() == Some(0),
                        default_value: row[4].as_str().map(str::to_string),
                        is_primary_key: row[5].as_i64().unwrap_or(0) > 0,
                    })
                    .collect())
            }
            backend => {
                let schema = if backend == DatabaseBackend::PostgreSQL {
                    "current_schema()"
                } else {
                    "DATABASE()"
                };
                let sql = format!(
                    "SELECT column_name, data_type, is_nullable, column_default \
                     FROM information_schema.columns \
                     WHERE table_schema = {} AND table_name = {} \
                     ORDER BY ordinal_position",
                    schema,
                    literal(table)
                );
                let output = self.fetch(&sql).await?;

                Ok(output
                    .rows
                    .iter()
                    .map(|row| ColumnInfo {
                        name: cell_text(&row[0]),
                        data_type: cell_text(&row[1]),
                        nullable: row[2].as_str() == Some("YES"),
                        default_value: row[3].as_str().map(str::to_string),
                        is_primary_key: false,
                    })
                    .collect())
            }
        }
    }

    /// Describe tables for the model: DDL-like column list plus sample rows
    ///
    /// Every name must be an existing table; unknown names are reported
    /// together in one error.
    pub async fn describe_tables(&self, names: &[String], sample_rows: usize) -> Result<String> {
        let existing = self.list_tables().await?;
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !existing.iter().any(|t| t == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(ChatDbError::UnknownTables(unknown.join(", ")));
        }

        let mut sections = Vec::with_capacity(names.len());
        for name in names {
            sections.push(self.describe_table(name, sample_rows).await?);
        }
        Ok(sections.join("\n\n"))
    }

    async fn describe_table(&self, table: &str, sample_rows: usize) -> Result<String> {
        let backend = self.backend();
        let quoted = backend.quote_identifier(table);
        let columns = self.table_columns(table).await?;

        let mut out = String::new();
        let _ = writeln!(out, "CREATE TABLE {} (", quoted);
        let definitions: Vec<String> = columns
            .iter()
            .map(|col| {
                let mut def = format!("\t{} {}", backend.quote_identifier(&col.name), col.data_type);
                if !col.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = &col.default_value {
                    let _ = write!(def, " DEFAULT {}", default);
                }
                if col.is_primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();
        let _ = writeln!(out, "{}", definitions.join(",\n"));
        out.push(')');

        if sample_rows > 0 {
            let sql = format!("SELECT * FROM {} LIMIT {}", quoted, sample_rows);
            let sample = self.fetch(&sql).await?;
            let _ = write!(
                out,
                "\n\n/*\n{} rows from {} table:\n{}\n*/",
                sample_rows,
                table,
                sample.render()
            );
        }

        Ok(out)
    }
}
