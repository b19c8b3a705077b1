//! Tool-calling SQL agent
//!
//! Drives the conversation between the model and the [`SqlToolkit`] until
//! the model answers without requesting tools.

use crate::agent::prompt::{self, strip_code_fence};
use crate::agent::toolkit::SqlToolkit;
use crate::agent::QueryAgent;
use crate::config::{Settings, DEFAULT_MAX_ITERATIONS, DEFAULT_TOP_K};
use crate::database::DatabasePool;
use crate::error::{ChatDbError, Result};
use crate::llm::{ChatModel, Message, OpenAiClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// SQL agent
pub struct SqlAgent {
    llm: Arc<dyn ChatModel>,
    toolkit: SqlToolkit,
    system_prompt: String,
    max_iterations: usize,
}

impl SqlAgent {
    /// Create an agent with the default prompt and iteration limit
    pub fn new(llm: Arc<dyn ChatModel>, toolkit: SqlToolkit) -> Self {
        let system_prompt = prompt::system_prompt(toolkit.dialect(), DEFAULT_TOP_K);
        Self {
            llm,
            toolkit,
            system_prompt,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Build the agent described by the settings: OpenAI model plus toolkit
    pub fn from_settings(settings: &Settings, db: DatabasePool) -> Result<Self> {
        let llm: Arc<dyn ChatModel> = Arc::new(OpenAiClient::from_settings(settings)?);
        let toolkit = SqlToolkit::new(db, llm.clone(), settings.sample_rows);
        let system_prompt = prompt::system_prompt(toolkit.dialect(), settings.top_k);

        Ok(Self {
            llm,
            toolkit,
            system_prompt,
            max_iterations: settings.max_iterations,
        })
    }

    /// Set the iteration limit
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// The system prompt sent with every question
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer one question
    pub async fn run(&self, question: &str) -> Result<String> {
        let tools = self.toolkit.definitions();
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(question),
            Message::assistant(prompt::FUNCTIONS_SUFFIX),
        ];

        for step in 1..=self.max_iterations {
            let response = self.llm.chat(&messages, &tools).await?;

            if !response.has_tool_calls() {
                info!("Agent finished after {} step(s)", step);
                let answer = strip_code_fence(&response.content);
                if answer.trim().is_empty() {
                    return Err(ChatDbError::LLMResponse(
                        "the model returned an empty answer".to_string(),
                    ));
                }
                return Ok(answer.to_string());
            }

            messages.push(Message::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let output = self.toolkit.invoke(call).await;
                debug!("`{}` returned:\n{}", call.name, output);
                messages.push(Message::tool(call.id.clone(), output));
            }
        }

        Err(ChatDbError::AgentIterationLimit(self.max_iterations))
    }
}

#[async_trait]
impl QueryAgent for SqlAgent {
    async fn submit_query(&self, text: &str) -> Result<String> {
        self.run(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, MessageRole, ToolCall, ToolDefinition};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    struct ScriptedModel {
        responses: Mutex<VecDeque<ChatResponse>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ChatDbError::LLMResponse("script exhausted".to_string()))
        }

        fn provider_name(&self) -> &str {
            "Scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    async fn agent(model: Arc<ScriptedModel>) -> SqlAgent {
        let db = DatabasePool::connect("sqlite::memory:").await.unwrap();
        db.fetch(
            "CREATE TABLE artists (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO artists (id, name) VALUES (1, 'AC/DC'), (2, 'Accept');",
        )
        .await
        .unwrap();
        let toolkit = SqlToolkit::new(db, model.clone(), 3);
        SqlAgent::new(model, toolkit)
    }

    #[tokio::test]
    async fn test_agent_runs_tools_then_answers() {
        let model = ScriptedModel::new(vec![
            ChatResponse::with_tool_calls(vec![tool_call("c1", "sql_db_list_tables", "{}")]),
            ChatResponse::with_tool_calls(vec![tool_call(
                "c2",
                "sql_db_query",
                r#"{"query":"SELECT count(*) AS n FROM artists"}"#,
            )]),
            ChatResponse::text("<!doctype html><html><body>2</body></html>"),
        ]);
        let agent = agent(model.clone()).await;

        let answer = agent.submit_query("How many artists?").await.unwrap();
        assert_eq!(answer, "<!doctype html><html><body>2</body></html>");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);

        let first = &requests[0];
        assert_eq!(first[0].role, MessageRole::System);
        assert_eq!(first[1], Message::user("How many artists?"));
        assert_eq!(first[2], Message::assistant(prompt::FUNCTIONS_SUFFIX));

        let last = &requests[2];
        let tool_results: Vec<&Message> =
            last.iter().filter(|m| m.role == MessageRole::Tool).collect();
        assert_eq!(tool_results.len(), 2);
        assert_eq!(tool_results[0].content, "artists");
        assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("c1"));
        assert!(tool_results[1].content.contains('2'));
    }

    #[tokio::test]
    async fn test_agent_strips_code_fence() {
        let model = ScriptedModel::new(vec![ChatResponse::text(
            "```html\n<!doctype html><html></html>\n```",
        )]);
        let agent = agent(model).await;
        assert_eq!(
            agent.run("anything").await.unwrap(),
            "<!doctype html><html></html>"
        );
    }

    #[tokio::test]
    async fn test_agent_iteration_limit() {
        let looping: Vec<ChatResponse> = (0..5)
            .map(|i| {
                ChatResponse::with_tool_calls(vec![tool_call(
                    &format!("c{i}"),
                    "sql_db_list_tables",
                    "{}",
                )])
            })
            .collect();
        let agent = agent(ScriptedModel::new(looping)).await.with_max_iterations(3);

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, ChatDbError::AgentIterationLimit(3)));
    }

    #[tokio::test]
    async fn test_agent_rejects_empty_answer() {
        let agent = agent(ScriptedModel::new(vec![ChatResponse::text("  ")])).await;
        assert!(matches!(
            agent.run("anything").await.unwrap_err(),
            ChatDbError::LLMResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_agent_propagates_model_errors() {
        let agent = agent(ScriptedModel::new(vec![])).await;
        assert!(agent.submit_query("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_system_prompt_uses_dialect() {
        let agent = agent(ScriptedModel::new(vec![])).await;
        assert!(agent.system_prompt().contains("The database is sqlite"));
    }
}
