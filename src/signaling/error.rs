//! Signaling error types

use serde_json::Value;
use thiserror::Error;

/// Errors from a request to the signaling server
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Server error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
