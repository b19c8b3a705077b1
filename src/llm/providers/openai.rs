//! OpenAI API Provider
//!
//! This module implements the ChatModel trait for OpenAI's Chat Completions
//! API, including tool calling and token streaming.

use crate::config::Settings;
use crate::error::{ChatDbError, Result};
use crate::llm::client::{extract_error_message, LLMHttpClient};
use crate::llm::provider::{
    ChatModel, ChatResponse, Message, MessageRole, StdoutSink, TokenSink, ToolCall,
    ToolDefinition,
};
use crate::llm::stream::{SseDecoder, SseEvent};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const PROVIDER: &str = "OpenAI";

/// OpenAI client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication
    pub api_key: String,
    /// API base URL (without the `/chat/completions` suffix)
    pub api_base: String,
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Create a config with the default model, base URL and zero temperature
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: crate::config::DEFAULT_API_BASE.to_string(),
            model: crate::config::DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            timeout_secs: crate::config::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl From<&Settings> for OpenAiConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            api_base: settings.api_base.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// OpenAI chat model
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: LLMHttpClient,
    /// When set, responses are streamed and every token is forwarded here
    sink: Option<Arc<dyn TokenSink>>,
}

impl OpenAiClient {
    /// Create a new, non-streaming client
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = LLMHttpClient::with_timeout(PROVIDER, config.timeout_secs)?;
        Ok(Self {
            config,
            client,
            sink: None,
        })
    }

    /// Create a client from the application settings
    ///
    /// Streams to stdout when streaming is enabled.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Self::new(OpenAiConfig::from(settings))?;
        Ok(if settings.streaming {
            client.with_sink(Arc::new(StdoutSink::default()))
        } else {
            client
        })
    }

    /// Stream responses into `sink`
    pub fn with_sink(mut self, sink: Arc<dyn TokenSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the HTTP client (retry tuning)
    pub fn with_http_client(mut self, client: LLMHttpClient) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> OpenAiRequest {
        OpenAiRequest {
            model: self.config.model.clone(),
            messages: convert_messages(messages),
            temperature: self.config.temperature,
            tools: tools
                .iter()
                .map(|tool| OpenAiTool {
                    kind: "function".to_string(),
                    function: OpenAiFunctionDef {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
            stream,
        }
    }

    async fn chat_blocking(&self, request: &OpenAiRequest) -> Result<ChatResponse> {
        let headers = LLMHttpClient::build_headers(&self.config.api_key)?;
        let body = self
            .client
            .post_with_retry(&self.endpoint(), headers, request)
            .await?;

        let response: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
            ChatDbError::LLMResponse(format!("Failed to parse response: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatDbError::LLMResponse("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
        })
    }

    async fn chat_streaming(
        &self,
        request: &OpenAiRequest,
        sink: &dyn TokenSink,
    ) -> Result<ChatResponse> {
        let headers = LLMHttpClient::build_headers(&self.config.api_key)?;
        let response = self
            .client
            .send_with_retry(&self.endpoint(), headers, request)
            .await?;

        let mut decoder = SseDecoder::new();
        let mut accumulator = StreamAccumulator::default();
        let mut bytes = response.bytes_stream();
        let mut done = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                done |= accumulator.apply(event, sink)?;
            }
            if done {
                break;
            }
        }
        if !done {
            for event in decoder.finish() {
                accumulator.apply(event, sink)?;
            }
        }

        sink.on_end();
        Ok(accumulator.finish())
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse> {
        let stream = self.sink.is_some();
        let request = self.build_request(messages, tools, stream);
        debug!(
            "Sending {} message(s) to {} ({} tool(s), stream={})",
            messages.len(),
            self.config.model,
            tools.len(),
            stream
        );

        match &self.sink {
            Some(sink) => self.chat_streaming(&request, sink.as_ref()).await,
            None => self.chat_blocking(&request).await,
        }
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Convert our Message format to OpenAI format
fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    messages
        .iter()
        .map(|msg| {
            let tool_calls: Vec<OpenAiToolCall> = msg
                .tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            // Assistant turns that only call tools carry no content
            let content = if msg.role == MessageRole::Assistant
                && msg.content.is_empty()
                && !tool_calls.is_empty()
            {
                None
            } else {
                Some(msg.content.clone())
            };

            OpenAiMessage {
                role: msg.role.as_str().to_string(),
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: msg.tool_call_id.clone(),
            }
        })
        .collect()
}

/// Folds streamed deltas into a complete response
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    /// Apply one event; returns true once the stream is finished
    fn apply(&mut self, event: SseEvent, sink: &dyn TokenSink) -> Result<bool> {
        let data = match event {
            SseEvent::Done => return Ok(true),
            SseEvent::Data(data) => data,
        };

        let value: serde_json::Value = serde_json::from_str(&data).map_err(|e| {
            ChatDbError::LLMResponse(format!("Failed to parse stream event: {}", e))
        })?;
        if value.get("error").is_some() {
            return Err(ChatDbError::llm_api(PROVIDER, 0, extract_error_message(&data)));
        }

        let chunk: OpenAiStreamChunk = serde_json::from_value(value).map_err(|e| {
            ChatDbError::LLMResponse(format!("Failed to parse stream event: {}", e))
        })?;

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                sink.on_token(&content);
                self.content.push_str(&content);
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                if self.tool_calls.len() <= delta.index {
                    self.tool_calls.resize(delta.index + 1, ToolCall::default());
                }
                let call = &mut self.tool_calls[delta.index];
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }

        Ok(false)
    }

    fn finish(self) -> ChatResponse {
        ChatResponse {
            content: self.content,
            tool_calls: self.tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDeltaToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
