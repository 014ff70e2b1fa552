//! Error types for Tern.

use thiserror::Error;

/// Primary error type for all Tern operations.
#[derive(Error, Debug)]
pub enum TernError {
    /// Missing/invalid credentials or model id at agent-build time.
    /// Always surfaced to the caller, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Underlying client failure during a turn, with the original cause
    /// preserved. Retry policy, if any, belongs to the network layer.
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TernError {
    /// Create an execution error without an underlying cause.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying client failure, preserving it as the source.
    pub fn execution_from(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an API error for an HTTP status.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error originates from agent construction rather than a turn.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TernError>;
