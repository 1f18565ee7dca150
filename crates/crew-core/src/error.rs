//! Error Types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CrewError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CrewError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool arguments violated the declared schema
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Hand-off decision could not be interpreted
    #[error("Decision error: {0}")]
    Decision(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CrewError {
    fn from(err: anyhow::Error) -> Self {
        CrewError::Other(err.to_string())
    }
}
