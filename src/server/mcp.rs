//! MCP server over stdio.
//!
//! One JSON-RPC 2.0 message per line on stdin, one response per line on
//! stdout. Protocol failures are JSON-RPC errors; a failing tool is still a
//! successful `tools/call` whose result carries `isError`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::handlers::parse_arguments;
use super::{handle_tool_call, SharedState};
use crate::error::{McpError, McpResult};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// An incoming JSON-RPC message. Without `id` it is a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, only "2.0" is served.
    pub jsonrpc: String,
    /// Request identifier.
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing JSON-RPC message.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Identifier of the answered request, null when it could not be read.
    pub id: Value,
    /// Method result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Tool name used in `tools/call`.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the tool arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters of `tools/call`.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// Tool to run.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Text block of a tool result.
#[derive(Debug, Serialize)]
pub struct TextContent {
    /// Always "text".
    #[serde(rename = "type")]
    pub content_type: &'static str,
    /// The text.
    pub text: String,
}

/// Result of `tools/call`.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// A single text block: the pretty-printed tool output or the error message.
    pub content: Vec<TextContent>,
    /// Set when the tool failed.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

impl ToolCallResult {
    /// Shape a tool outcome for the client.
    pub fn from_outcome(outcome: McpResult<Value>) -> Self {
        let (text, is_error) = match outcome {
            Ok(value) => (
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                None,
            ),
            Err(e) => (format!("Error: {}", e), Some(true)),
        };

        Self {
            content: vec![TextContent {
                content_type: "text",
                text,
            }],
            is_error,
        }
    }
}

/// JSON-RPC code reported for a protocol-level failure.
fn error_code(err: &McpError) -> i32 {
    match err {
        McpError::InvalidRequest { .. } => INVALID_REQUEST,
        McpError::MethodNotFound { .. } => METHOD_NOT_FOUND,
        McpError::InvalidParameters { .. } => INVALID_PARAMS,
        McpError::UnknownTool { .. } | McpError::ExecutionFailed { .. } | McpError::Json(_) => {
            INTERNAL_ERROR
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Serves the form tools on stdin/stdout.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve until stdin closes.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Form graph advisor MCP server starting...");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }

        info!("EOF received, shutting down");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        debug!(request = %line, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "Unreadable request");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle one message. Notifications never get a response.
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        let outcome = if jsonrpc == JSONRPC_VERSION {
            self.dispatch(&method, params).await
        } else {
            Err(McpError::InvalidRequest {
                message: format!("unsupported jsonrpc version '{}'", jsonrpc),
            })
        };

        let Some(id) = id else {
            if let Err(e) = outcome {
                debug!(method = %method, error = %e, "Notification ignored");
            }
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(e) => {
                warn!(method = %method, error = %e, "Request failed");
                JsonRpcResponse::error(Some(id), error_code(&e), e.to_string())
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => {
                info!("Handling initialize request");
                Ok(initialize_result())
            }
            "initialized" | "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => {
                let params: ToolCallParams = parse_arguments("tools/call", params)?;
                info!(tool = %params.name, "Handling tool call");

                let outcome = handle_tool_call(&self.state, &params.name, params.arguments).await;
                Ok(serde_json::to_value(ToolCallResult::from_outcome(outcome))?)
            }
            _ => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }),
        }
    }
}

/// Every tool exposed by the server.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        get_next_question_tool(),
        get_best_models_tool(),
        get_submit_tool(),
        get_resubmit_tool(),
        get_replay_tool(),
        get_review_tool(),
        get_list_tool(),
        get_answers_tool(),
        get_metrics_tool(),
        get_rank_tool(),
    ]
}

fn history_schema() -> Value {
    json!({
        "type": "array",
        "description": "Answers given so far, one entry per question. Each entry lists the chosen option labels, or the free text of an open question.",
        "items": {
            "type": "array",
            "items": { "type": "string" }
        }
    })
}

/// Get the next question tool definition
fn get_next_question_tool() -> Tool {
    Tool {
        name: "form_next_question".to_string(),
        description: "Return the question reached after the given answers, with its visible options and help text.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "history": history_schema()
            },
            "required": ["history"],
            "additionalProperties": false
        }),
    }
}

/// Get the best models tool definition
fn get_best_models_tool() -> Tool {
    Tool {
        name: "form_best_models".to_string(),
        description: "Score the candidate models against the given answers and return the best ones.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "history": history_schema(),
                "k": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of models to return (defaults to the configured count)"
                }
            },
            "required": ["history"],
            "additionalProperties": false
        }),
    }
}

/// Get the submit tool definition
fn get_submit_tool() -> Tool {
    Tool {
        name: "form_submit".to_string(),
        description: "Store a completed form for a user and record the recommended models.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "form_name": { "type": "string" },
                "history": history_schema()
            },
            "required": ["username", "form_name", "history"],
            "additionalProperties": false
        }),
    }
}

/// Get the resubmit tool definition
fn get_resubmit_tool() -> Tool {
    Tool {
        name: "form_resubmit".to_string(),
        description: "Replace a stored form, optionally under a new name, and rescore it.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "old_form_name": { "type": "string" },
                "new_form_name": {
                    "type": "string",
                    "description": "Name to store the form under (defaults to the old name)"
                },
                "history": history_schema()
            },
            "required": ["username", "old_form_name", "history"],
            "additionalProperties": false
        }),
    }
}

/// Get the replay tool definition
fn get_replay_tool() -> Tool {
    Tool {
        name: "form_replay".to_string(),
        description: "Walk new answers over a stored form, returning the stored answer to suggest at each step and whether the form is being edited.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "form_name": { "type": "string" },
                "history": history_schema()
            },
            "required": ["username", "form_name", "history"],
            "additionalProperties": false
        }),
    }
}

/// Get the review tool definition
fn get_review_tool() -> Tool {
    Tool {
        name: "form_review".to_string(),
        description: "Show a stored form as question and answer pairs.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "form_name": { "type": "string" }
            },
            "required": ["username", "form_name"],
            "additionalProperties": false
        }),
    }
}

/// Get the list tool definition
fn get_list_tool() -> Tool {
    Tool {
        name: "form_list".to_string(),
        description: "List a user's stored forms with their recommendations, or every known user when no username is given.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the answers tool definition
fn get_answers_tool() -> Tool {
    Tool {
        name: "form_answers".to_string(),
        description: "Read the answers stored for a form, by owner and name or by the id of its first path node.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "form_name": { "type": "string" },
                "start_id": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the metrics tool definition
fn get_metrics_tool() -> Tool {
    Tool {
        name: "form_metrics".to_string(),
        description: "List the metrics relevant to a stored form, taken from the options it selected.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "username": { "type": "string" },
                "form_name": { "type": "string" }
            },
            "required": ["username", "form_name"],
            "additionalProperties": false
        }),
    }
}

/// Get the rank tool definition
fn get_rank_tool() -> Tool {
    Tool {
        name: "models_rank".to_string(),
        description: "Rank trained models on two metrics: Pareto-optimal flag and distance score, best first.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "models": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "metrics": {
                                "type": "object",
                                "additionalProperties": { "type": "number" }
                            },
                            "hyperparameters": {
                                "type": "object",
                                "additionalProperties": { "type": "string" }
                            }
                        },
                        "required": ["name", "metrics"]
                    }
                },
                "metric_a": { "type": "string" },
                "metric_b": { "type": "string" },
                "optimal_only": {
                    "type": "boolean",
                    "description": "Only return Pareto-optimal models"
                }
            },
            "required": ["models", "metric_a", "metric_b"],
            "additionalProperties": false
        }),
    }
}
