use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::form::Answer;
use crate::questions::QuestionNode;
use crate::ranking::{optimal_only, Model};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Traversal
        "form_next_question" => handle_next_question(state, arguments).await,
        "form_best_models" => handle_best_models(state, arguments).await,
        // Stored forms
        "form_submit" => handle_submit(state, arguments).await,
        "form_resubmit" => handle_resubmit(state, arguments).await,
        "form_replay" => handle_replay(state, arguments).await,
        "form_review" => handle_review(state, arguments).await,
        "form_list" => handle_list(state, arguments).await,
        "form_answers" => handle_answers(state, arguments).await,
        "form_metrics" => handle_metrics(state, arguments).await,
        // Model ranking
        "models_rank" => handle_rank(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter types
// ============================================================================

/// Parameters carrying only an answer history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub history: Vec<Answer>,
}

/// Parameters for form_best_models.
#[derive(Debug, Deserialize)]
pub struct BestModelsParams {
    #[serde(default)]
    pub history: Vec<Answer>,
    pub k: Option<usize>,
}

/// Parameters naming a stored form, with an optional history.
#[derive(Debug, Deserialize)]
pub struct FormParams {
    pub username: String,
    pub form_name: String,
    #[serde(default)]
    pub history: Vec<Answer>,
}

/// Parameters for form_resubmit.
#[derive(Debug, Deserialize)]
pub struct ResubmitParams {
    pub username: String,
    pub old_form_name: String,
    pub new_form_name: Option<String>,
    #[serde(default)]
    pub history: Vec<Answer>,
}

/// Parameters for form_list.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub username: Option<String>,
}

/// Parameters for form_answers.
#[derive(Debug, Deserialize)]
pub struct AnswersParams {
    pub username: Option<String>,
    pub form_name: Option<String>,
    pub start_id: Option<String>,
}

/// Parameters for models_rank.
#[derive(Debug, Deserialize)]
pub struct RankParams {
    pub models: Vec<Model>,
    pub metric_a: String,
    pub metric_b: String,
    #[serde(default)]
    pub optimal_only: bool,
}

/// Response of form_next_question.
#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub question: QuestionNode,
    pub help_text: String,
    pub complete: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle form_next_question tool call
async fn handle_next_question(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_next_question", arguments, |params: HistoryParams| async move {
        let question = state.advisor.next_question(&params.history).await?;
        Ok::<_, crate::error::FormError>(NextQuestionResponse {
            help_text: question.full_help_text(),
            complete: question.is_end(),
            question,
        })
    })
    .await
}

/// Handle form_best_models tool call
async fn handle_best_models(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_best_models", arguments, |params: BestModelsParams| async move {
        let models = state.advisor.best_models(&params.history, params.k).await?;
        Ok::<_, crate::error::FormError>(serde_json::json!({ "best_models": models }))
    })
    .await
}

/// Handle form_submit tool call
async fn handle_submit(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_submit", arguments, |params: FormParams| async move {
        state
            .advisor
            .submit(&params.username, &params.form_name, &params.history)
            .await
    })
    .await
}

/// Handle form_resubmit tool call
async fn handle_resubmit(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_resubmit", arguments, |params: ResubmitParams| async move {
        let new_name = params
            .new_form_name
            .as_deref()
            .unwrap_or(&params.old_form_name);
        state
            .advisor
            .resubmit(&params.username, &params.old_form_name, new_name, &params.history)
            .await
    })
    .await
}

/// Handle form_replay tool call
async fn handle_replay(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_replay", arguments, |params: FormParams| async move {
        state
            .advisor
            .replay(&params.username, &params.form_name, &params.history)
            .await
    })
    .await
}

/// Handle form_review tool call
async fn handle_review(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_review", arguments, |params: FormParams| async move {
        state
            .advisor
            .review(&params.username, &params.form_name)
            .await
    })
    .await
}

/// Handle form_list tool call
async fn handle_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ListParams = match arguments {
        Some(args) => parse_arguments("form_list", Some(args))?,
        None => ListParams::default(),
    };

    let result = match params.username {
        Some(username) => {
            let forms = state
                .advisor
                .forms(&username)
                .await
                .map_err(execution_failed)?;
            serde_json::json!({ "username": username, "forms": forms })
        }
        None => {
            let users = state.advisor.users().await.map_err(execution_failed)?;
            serde_json::json!({ "users": users })
        }
    };

    Ok(result)
}

/// Handle form_answers tool call
async fn handle_answers(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AnswersParams = parse_arguments("form_answers", arguments)?;

    let answers = match (params.start_id, params.username, params.form_name) {
        (Some(start_id), _, _) => state.advisor.list_answers(&start_id).await,
        (None, Some(username), Some(form_name)) => {
            state.advisor.form_answers(&username, &form_name).await
        }
        _ => {
            return Err(McpError::InvalidParameters {
                tool_name: "form_answers".to_string(),
                message: "either start_id or both username and form_name are required"
                    .to_string(),
            });
        }
    }
    .map_err(execution_failed)?;

    Ok(serde_json::json!({ "answers": answers }))
}

/// Handle form_metrics tool call
async fn handle_metrics(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("form_metrics", arguments, |params: FormParams| async move {
        let metrics = state
            .advisor
            .form_metrics(&params.username, &params.form_name)
            .await?;
        Ok::<_, crate::error::FormError>(serde_json::json!({ "metrics": metrics }))
    })
    .await
}

/// Handle models_rank tool call
async fn handle_rank(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: RankParams = parse_arguments("models_rank", arguments)?;

    if params.metric_a == params.metric_b {
        return Err(McpError::InvalidParameters {
            tool_name: "models_rank".to_string(),
            message: "metric_a and metric_b must differ".to_string(),
        });
    }

    let mut points = state
        .ranker
        .rank(params.models, &params.metric_a, &params.metric_b);
    if params.optimal_only {
        points = optimal_only(points);
    }

    Ok(serde_json::json!({
        "metric_a": params.metric_a,
        "metric_b": params.metric_b,
        "distance": state.ranker.distance(),
        "points": points,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

fn execution_failed(err: impl std::fmt::Display) -> McpError {
    McpError::ExecutionFailed {
        message: err.to_string(),
    }
}

/// Helper to parse arguments with consistent error handling
pub(super) fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Generic handler that parses typed parameters, runs an advisor operation
/// and serializes its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params).await.map_err(execution_failed)?;

    serde_json::to_value(result).map_err(McpError::Json)
}
