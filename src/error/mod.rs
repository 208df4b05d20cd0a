use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),
}

/// Graph store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Vertex not found: {id}")]
    VertexNotFound { id: String },

    #[error("Vertex already exists: {id}")]
    VertexExists { id: String },

    #[error("Edge already exists: {id}")]
    EdgeExists { id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Questionnaire, path and scoring errors.
///
/// Store failures are carried unmodified in [`FormError::Storage`]; nothing in
/// this crate retries them.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Form '{form_name}' already exists for user '{username}'")]
    AlreadyExists { username: String, form_name: String },

    #[error("Invalid selection for question {question_id}: {answer}")]
    InvalidSelection { question_id: String, answer: String },

    #[error("Malformed question graph at {question_id}: {message}")]
    MalformedGraph { question_id: String, message: String },

    #[error("Username '{username}' names an existing {label} vertex")]
    UserConflict { username: String, label: String },

    #[error("Form is incomplete: {answered} answers do not reach the end of the questionnaire")]
    Incomplete { answered: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FormError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        FormError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_selection(question_id: impl Into<String>, answer: impl Into<String>) -> Self {
        FormError::InvalidSelection {
            question_id: question_id.into(),
            answer: answer.into(),
        }
    }

    pub(crate) fn malformed(question_id: impl Into<String>, message: impl Into<String>) -> Self {
        FormError::MalformedGraph {
            question_id: question_id.into(),
            message: message.into(),
        }
    }
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for questionnaire operations
pub type FormResult<T> = Result<T, FormError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
