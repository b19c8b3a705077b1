//! LLM Provider Trait
//!
//! This module defines the message model shared by the agent and the
//! provider implementations, the [`ChatModel`] trait, and the token sink used
//! for streaming output.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// LLM message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (sets behavior/context)
    System,
    /// User message (query or input)
    User,
    /// Assistant message (response)
    Assistant,
    /// Result of a tool invocation
    Tool,
}

impl MessageRole {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, echoed back with the result
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// LLM message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Tool calls made by an assistant message
    pub tool_calls: Vec<ToolCall>,
    /// Which call a tool message answers
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(MessageRole::Tool, content)
        }
    }
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does, as shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// LLM response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Generated text content (may be empty when only tools are called)
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason (e.g., "stop", "tool_calls")
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Create a text-only response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a response that calls tools
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            ..Self::default()
        }
    }

    /// Returns true if the model asked for tools
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Receives tokens as a streaming response is generated
pub trait TokenSink: Send + Sync {
    /// Called for every content delta
    fn on_token(&self, token: &str);

    /// Called once a streamed response has finished
    fn on_end(&self) {}
}

/// Writes tokens to stdout as they arrive
#[derive(Debug, Default)]
pub struct StdoutSink {
    wrote: AtomicBool,
}

impl TokenSink for StdoutSink {
    fn on_token(&self, token: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
        self.wrote.store(true, Ordering::Relaxed);
    }

    fn on_end(&self) {
        if self.wrote.swap(false, Ordering::Relaxed) {
            println!();
        }
    }
}

/// Trait for chat models
///
/// This trait defines the interface that all LLM providers must implement.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a response, offering the given tools
    ///
    /// # Arguments
    /// * `messages` - Conversation so far
    /// * `tools` - Tools the model may call (may be empty)
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse>;

    /// Generate a plain text answer without tools
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        Ok(self.chat(messages, &[]).await?.content)
    }

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model(&self) -> &str;
}
