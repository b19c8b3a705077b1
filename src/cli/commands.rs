//! Command handling for the chat prompt
//!
//! A line is either one of the loop commands or a question for the agent.

use crate::error::ChatDbError;

/// What a line typed at the prompt means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `exit` or `quit`
    Quit,
    /// `html`: turn the browser preview on
    EnableHtml,
    /// `nohtml`: turn the browser preview off
    DisableHtml,
    /// Blank line
    Empty,
    /// A natural-language question
    Query(String),
}

impl Command {
    /// Parse a line of user input
    pub fn parse(line: &str) -> Self {
        let text = line.trim();

        match text.to_lowercase().as_str() {
            "" => Command::Empty,
            "exit" | "quit" => Command::Quit,
            "html" => Command::EnableHtml,
            "nohtml" => Command::DisableHtml,
            _ => Command::Query(text.to_string()),
        }
    }
}

/// Format an error for display
pub fn format_error(error: &ChatDbError) -> String {
    format!("Error: {}", error)
}
