//! ChatDB Library
//!
//! Ask questions about a SQL database in plain language and get the answer
//! back as an HTML page. The main binary is in src/main.rs.

pub mod agent;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
