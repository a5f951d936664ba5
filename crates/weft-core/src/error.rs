use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // Model errors
    #[error("No active provider: {0}")]
    NoActiveProvider(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    // Node errors
    #[error("{kind} node is missing required field '{field}'")]
    MissingField { kind: String, field: String },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("User declined input for node {0}")]
    InputDeclined(String),

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("No executor registered for node type '{0}'")]
    ExecutorNotFound(String),

    // Graph errors
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    pub fn missing_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;
