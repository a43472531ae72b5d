use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Target selection error: {0}")]
    Selection(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NlqError>;
