//! SQL agent module
//!
//! Turns a natural-language question into database tool calls and an HTML
//! answer.

pub mod executor;
pub mod prompt;
pub mod toolkit;

pub use executor::SqlAgent;
pub use toolkit::SqlToolkit;

use crate::error::Result;
use async_trait::async_trait;

/// Anything that can answer a question typed at the prompt
#[async_trait]
pub trait QueryAgent: Send + Sync {
    /// Answer the question, returning an HTML document
    async fn submit_query(&self, text: &str) -> Result<String>;
}
