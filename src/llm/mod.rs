//! LLM integration module
//!
//! This module provides the trait-based chat model abstraction, the HTTP
//! plumbing shared by providers, and the OpenAI implementation.

pub mod client;
pub mod provider;
pub mod stream;

// Provider implementations
pub mod providers {
    pub mod openai;
}

// Re-exports
pub use provider::{
    ChatModel, ChatResponse, Message, MessageRole, StdoutSink, TokenSink, ToolCall,
    ToolDefinition,
};
pub use providers::openai::{OpenAiClient, OpenAiConfig};
