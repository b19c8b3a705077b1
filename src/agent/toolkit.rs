//! SQL toolkit
//!
//! The four database tools offered to the model. Tool failures are turned
//! into `Error: ...` strings and handed back to the model, which is expected
//! to correct itself.

use crate::agent::prompt::{query_checker_prompt, strip_code_fence};
use crate::database::DatabasePool;
use crate::error::{ChatDbError, Result};
use crate::llm::{ChatModel, Message, ToolCall, ToolDefinition};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs a read-only query
pub const QUERY_TOOL: &str = "sql_db_query";
/// Describes tables with sample rows
pub const SCHEMA_TOOL: &str = "sql_db_schema";
/// Lists tables
pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
/// Asks the model to double-check a query
pub const QUERY_CHECKER_TOOL: &str = "sql_db_query_checker";

/// Database tools bundled for the agent
pub struct SqlToolkit {
    db: DatabasePool,
    llm: Arc<dyn ChatModel>,
    sample_rows: usize,
}

impl SqlToolkit {
    /// Create a toolkit over a database and the model used for query checking
    pub fn new(db: DatabasePool, llm: Arc<dyn ChatModel>, sample_rows: usize) -> Self {
        Self {
            db,
            llm,
            sample_rows,
        }
    }

    /// SQL dialect of the connected database
    pub fn dialect(&self) -> &'static str {
        self.db.backend().dialect()
    }

    /// Tool definitions in the order they are offered to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: QUERY_TOOL.to_string(),
                description: format!(
                    "Input to this tool is a detailed and correct SQL query, output is a \
                     result from the database. If the query is not correct, an error message \
                     will be returned. If an error is returned, rewrite the query, check the \
                     query, and try again. If you encounter an issue with Unknown column \
                     'xxxx' in 'field list', use {} to query the correct table fields.",
                    SCHEMA_TOOL
                ),
                parameters: string_params("query", "A detailed and correct SQL query."),
            },
            ToolDefinition {
                name: SCHEMA_TOOL.to_string(),
                description: format!(
                    "Input to this tool is a comma-separated list of tables, output is the \
                     schema and sample rows for those tables. Be sure that the tables actually \
                     exist by calling {} first! Example Input: table1, table2, table3",
                    LIST_TABLES_TOOL
                ),
                parameters: string_params(
                    "table_names",
                    "A comma-separated list of the table names for which to return the schema.",
                ),
            },
            ToolDefinition {
                name: LIST_TABLES_TOOL.to_string(),
                description: "Input is an empty string, output is a comma-separated list of \
                              tables in the database."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "tool_input": {"type": "string", "description": "An empty string"}
                    }
                }),
            },
            ToolDefinition {
                name: QUERY_CHECKER_TOOL.to_string(),
                description: format!(
                    "Use this tool to double check if your query is correct before executing \
                     it. Always use this tool before executing a query with {}!",
                    QUERY_TOOL
                ),
                parameters: string_params("query", "A detailed and SQL query to be checked."),
            },
        ]
    }

    /// Execute a tool call, never failing
    pub async fn invoke(&self, call: &ToolCall) -> String {
        info!("Invoking `{}` with {}", call.name, call.arguments);

        match self.run(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool `{}` failed: {}", call.name, e);
                format!("Error: {}", e)
            }
        }
    }

    async fn run(&self, name: &str, arguments: &str) -> Result<String> {
        match name {
            QUERY_TOOL => {
                let query = required_arg(arguments, "query")?;
                Ok(self.db.run_query(&query).await?.render())
            }
            SCHEMA_TOOL => {
                let names: Vec<String> = required_arg(arguments, "table_names")?
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect();
                if names.is_empty() {
                    return Err(ChatDbError::LLMResponse(
                        "table_names must list at least one table".to_string(),
                    ));
                }
                self.db.describe_tables(&names, self.sample_rows).await
            }
            LIST_TABLES_TOOL => Ok(self.db.list_tables().await?.join(", ")),
            QUERY_CHECKER_TOOL => {
                let query = required_arg(arguments, "query")?;
                let prompt = query_checker_prompt(&query, self.dialect());
                let checked = self.llm.complete(&[Message::user(prompt)]).await?;
                Ok(strip_code_fence(&checked).trim().to_string())
            }
            other => Err(ChatDbError::LLMResponse(format!(
                "{} is not a valid tool, try one of [{}]",
                other,
                [QUERY_TOOL, SCHEMA_TOOL, LIST_TABLES_TOOL, QUERY_CHECKER_TOOL].join(", ")
            ))),
        }
    }
}

fn string_params(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            name: {"type": "string", "description": description}
        },
        "required": [name]
    })
}

/// Pull a string argument out of the call's JSON arguments
///
/// A bare JSON string is accepted as the argument itself.
fn required_arg(arguments: &str, key: &str) -> Result<String> {
    let value: Value = serde_json::from_str(arguments).map_err(|e| {
        ChatDbError::LLMResponse(format!("Invalid tool arguments: {}", e))
    })?;

    match value {
        Value::String(s) => Ok(s),
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatDbError::LLMResponse(format!("Missing argument `{}`", key))),
        _ => Err(ChatDbError::LLMResponse(format!(
            "Missing argument `{}`",
            key
        ))),
    }
}
