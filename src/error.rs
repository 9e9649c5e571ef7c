//! Error types for proxy operations.

use thiserror::Error;

/// Main error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{class_name} is missing required keys: {missing:?}")]
    MissingKeys {
        class_name: String,
        missing: Vec<String>,
    },

    #[error("Required handler not set: {0}")]
    MissingHandler(&'static str),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Object not found: {class_name}/{object_id}")]
    ObjectNotFound {
        class_name: String,
        object_id: String,
    },

    #[error("Backend not initialized")]
    NotInitialized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// True for errors raised by local precondition checks, before any
    /// backend call was made.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ProxyError::MissingKeys { .. } | ProxyError::MissingHandler(_)
        )
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        ProxyError::Serialization(e.to_string())
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
