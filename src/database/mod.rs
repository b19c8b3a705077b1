//! Database module
//!
//! This module provides database connection management, schema
//! introspection and read-only query execution.

pub mod connection;
pub mod introspect;
pub mod query;
pub mod safety;

// Re-exports
pub use connection::{normalize_url, DatabaseBackend, DatabasePool};
pub use introspect::ColumnInfo;
pub use query::QueryOutput;
pub use safety::ensure_read_only;
