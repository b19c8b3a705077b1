//! Error types for ChatDB
//!
//! This module defines the error types used throughout the application.

use thiserror::Error;

/// Result type alias for ChatDB
pub type Result<T> = std::result::Result<T, ChatDbError>;

/// Main error type for ChatDB
#[derive(Error, Debug)]
pub enum ChatDbError {
    /// A required environment variable is missing or empty
    #[error("Environment variable {name} is not set.\n{example}")]
    MissingEnvVar {
        /// Variable name
        name: String,
        /// Human-readable example of a valid value
        example: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database URL could not be understood
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    /// Failed to connect to the database
    #[error("Failed to connect to database {url}: {source}")]
    DatabaseConnection {
        /// Connection URL with the password redacted
        url: String,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// A query failed at the database
    #[error("Query failed: {source}\nQuery: {query}")]
    DatabaseQuery {
        /// The query that failed
        query: String,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// Generic database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tables requested that do not exist
    #[error("Unknown table(s): {0}")]
    UnknownTables(String),

    /// The agent produced SQL that would modify data
    #[error("Only read-only queries are allowed: {0}")]
    ReadOnlyViolation(String),

    /// SQL that could not be parsed
    #[error("Could not parse SQL: {0}")]
    SqlParse(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP-related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// LLM API returned an error status
    #[error("{provider} API error ({status}): {message}")]
    LLMApiError {
        /// Provider name
        provider: String,
        /// Error message extracted from the response
        message: String,
        /// HTTP status code
        status: u16,
    },

    /// LLM returned something we could not use
    #[error("Unexpected LLM response: {0}")]
    LLMResponse(String),

    /// The agent kept calling tools without producing an answer
    #[error("Agent stopped after {0} iterations without a final answer")]
    AgentIterationLimit(usize),

    /// The browser could not be launched
    #[error("Failed to open browser: {0}")]
    Browser(String),

    /// Line editor errors
    #[error("Readline error: {0}")]
    Readline(String),
}

impl ChatDbError {
    /// Create a database connection error, hiding any password in the URL
    pub fn db_connection(url: impl AsRef<str>, source: sqlx::Error) -> Self {
        Self::DatabaseConnection {
            url: redact_url(url.as_ref()),
            source,
        }
    }

    /// Create a query error
    pub fn db_query(query: impl Into<String>, source: sqlx::Error) -> Self {
        Self::DatabaseQuery {
            query: query.into(),
            source,
        }
    }

    /// Create an LLM API error
    pub fn llm_api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::LLMApiError {
            provider: provider.into(),
            message: message.into(),
            status,
        }
    }
}

/// Replace the password component of a URL with `***`
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}
