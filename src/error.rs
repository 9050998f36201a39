//! Error types for Conflux

use thiserror::Error;

use crate::kinds::CapabilityKind;

/// Result type alias for Conflux operations
pub type Result<T> = std::result::Result<T, ConfluxError>;

/// Main error type for Conflux
#[derive(Error, Debug)]
pub enum ConfluxError {
    #[error("{} not found: {key}", .kind.label())]
    NotFound { kind: CapabilityKind, key: String },

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Unknown downstream server: {0}")]
    UnknownServer(String),

    #[error("Call to {server} failed: {message}")]
    OriginCall { server: String, message: String },

    #[error("Call to {server} timed out after {timeout_secs}s")]
    OriginTimeout { server: String, timeout_secs: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Session {0} is closed")]
    SessionClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfluxError {
    /// Get error code for the JSON-RPC protocol
    pub fn code(&self) -> i64 {
        match self {
            // Unresolvable keys and broken origins indicate a malformed
            // request from the client's point of view
            ConfluxError::NotFound { .. } => -32602,
            ConfluxError::InvalidRequest(_) => -32602,
            ConfluxError::OriginCall { .. } => -32602,
            ConfluxError::OriginTimeout { .. } => -32602,
            ConfluxError::UnknownServer(_) => -32602,
            ConfluxError::MethodNotFound(_) => -32601,
            ConfluxError::Serialization(_) => -32700,
            ConfluxError::UnknownSession(_) => -32001,
            _ => -32000,
        }
    }
}
