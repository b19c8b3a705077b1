//! Read-only guard
//!
//! Parses SQL with the backend's dialect and only lets a single
//! row-returning query through.

use crate::database::connection::DatabaseBackend;
use crate::error::{ChatDbError, Result};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

fn dialect_for(backend: DatabaseBackend) -> Box<dyn Dialect> {
    match backend {
        DatabaseBackend::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseBackend::MySQL => Box::new(MySqlDialect {}),
        DatabaseBackend::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Reject anything that is not exactly one read-only query
pub fn ensure_read_only(sql: &str, backend: DatabaseBackend) -> Result<()> {
    let dialect = dialect_for(backend);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| ChatDbError::SqlParse(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(ChatDbError::SqlParse("empty statement".to_string())),
        [Statement::Query(query)] => check_query(query),
        [other] => Err(ChatDbError::ReadOnlyViolation(format!(
            "{} statements are not allowed",
            statement_keyword(other)
        ))),
        _ => Err(ChatDbError::ReadOnlyViolation(
            "multiple statements are not allowed".to_string(),
        )),
    }
}

fn check_query(query: &Query) -> Result<()> {
    if !query.locks.is_empty() {
        return Err(ChatDbError::ReadOnlyViolation(
            "row locking clauses are not allowed".to_string(),
        ));
    }

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }

    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> Result<()> {
    match expr {
        SetExpr::Select(select) if select.into.is_some() => Err(
            ChatDbError::ReadOnlyViolation("SELECT ... INTO is not allowed".to_string()),
        ),
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => {
            Err(ChatDbError::ReadOnlyViolation(format!(
                "{} statements are not allowed",
                statement_keyword(stmt)
            )))
        }
        #[allow(unreachable_patterns)]
        _ => Err(ChatDbError::ReadOnlyViolation(
            "unsupported query form".to_string(),
        )),
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("Unknown")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(sql: &str) -> Result<()> {
        ensure_read_only(sql, DatabaseBackend::PostgreSQL)
    }

    #[test]
    fn test_select_is_allowed() {
        assert!(pg("SELECT * FROM users LIMIT 10").is_ok());
        assert!(pg("SELECT count(*) FROM orders;").is_ok());
        assert!(pg("WITH t AS (SELECT id FROM users) SELECT * FROM t").is_ok());
        assert!(pg("SELECT id FROM a UNION ALL SELECT id FROM b").is_ok());
    }

    #[test]
    fn test_dialect_specific_select() {
        assert!(ensure_read_only("SELECT `name` FROM `users`", DatabaseBackend::MySQL).is_ok());
        assert!(ensure_read_only("SELECT name FROM users LIMIT 5", DatabaseBackend::SQLite).is_ok());
    }

    #[test]
    fn test_mutations_are_rejected() {
        for sql in [
            "INSERT INTO users (name) VALUES ('x')",
            "UPDATE users SET name = 'x'",
            "DELETE FROM users",
            "DROP TABLE users",
            "CREATE TABLE t (id INT)",
            "TRUNCATE users",
        ] {
            let err = pg(sql).unwrap_err();
            assert!(
                matches!(err, ChatDbError::ReadOnlyViolation(_)),
                "expected rejection for {sql}"
            );
        }
    }

    #[test]
    fn test_violation_names_statement() {
        let err = pg("DELETE FROM users").unwrap_err();
        assert!(err.to_string().contains("DELETE"));
    }

    #[test]
    fn test_multiple_statements_are_rejected() {
        let err = pg("SELECT 1; DROP TABLE users").unwrap_err();
        assert!(err.to_string().contains("multiple statements"));
    }

    #[test]
    fn test_select_into_is_rejected() {
        assert!(pg("SELECT * INTO backup FROM users").is_err());
    }

    #[test]
    fn test_row_locks_are_rejected() {
        assert!(pg("SELECT * FROM users FOR UPDATE").is_err());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = pg("SELEKT everything").unwrap_err();
        assert!(matches!(err, ChatDbError::SqlParse(_)));
        assert!(matches!(pg("").unwrap_err(), ChatDbError::SqlParse(_)));
    }
}
