use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::node::NodeId;

/// Main error type for the clockvote coordinator and clock nodes
#[derive(Debug)]
pub enum ClockVoteError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Malformed wire message
    Decode(String),

    /// A request targeted a node with no live session
    NotConnected(NodeId),

    /// No reply arrived within the request budget
    Timeout(NodeId),

    /// The session was torn down while the request was outstanding
    ConnectionClosed(NodeId),

    /// Node id outside the configured set
    UnknownNode(NodeId),

    /// Weight assignment outside [0, 10]
    InvalidWeight(f64),

    /// System I/O errors
    Io(std::io::Error),

    /// Transport layer errors
    Transport(String),

    /// Internal lock poisoning or actor channel failures
    Concurrency(String),
}

impl fmt::Display for ClockVoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockVoteError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ClockVoteError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ClockVoteError::NotConnected(id) => write!(f, "Node {} is not connected", id),
            ClockVoteError::Timeout(id) => write!(f, "Request to node {} timed out", id),
            ClockVoteError::ConnectionClosed(id) => {
                write!(f, "Connection to node {} closed", id)
            }
            ClockVoteError::UnknownNode(id) => write!(f, "Node {} is not configured", id),
            ClockVoteError::InvalidWeight(w) => {
                write!(f, "Invalid weight {}: must be between 0 and 10", w)
            }
            ClockVoteError::Io(err) => write!(f, "I/O error: {}", err),
            ClockVoteError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ClockVoteError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl std::error::Error for ClockVoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClockVoteError::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, ClockVoteError>;

impl IntoResponse for ClockVoteError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl ClockVoteError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClockVoteError::Config(_) => StatusCode::BAD_REQUEST,
            ClockVoteError::Decode(_) => StatusCode::BAD_REQUEST,
            ClockVoteError::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            ClockVoteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ClockVoteError::ConnectionClosed(_) => StatusCode::BAD_GATEWAY,
            ClockVoteError::UnknownNode(_) => StatusCode::NOT_FOUND,
            ClockVoteError::InvalidWeight(_) => StatusCode::BAD_REQUEST,
            ClockVoteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClockVoteError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClockVoteError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            ClockVoteError::Config(_) => "configuration_error",
            ClockVoteError::Decode(_) => "decode_error",
            ClockVoteError::NotConnected(_) => "not_connected",
            ClockVoteError::Timeout(_) => "timeout",
            ClockVoteError::ConnectionClosed(_) => "connection_closed",
            ClockVoteError::UnknownNode(_) => "unknown_node",
            ClockVoteError::InvalidWeight(_) => "invalid_weight",
            ClockVoteError::Io(_) => "io_error",
            ClockVoteError::Transport(_) => "transport_error",
            ClockVoteError::Concurrency(_) => "concurrency_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for ClockVoteError {
    fn from(err: std::io::Error) -> Self {
        ClockVoteError::Io(err)
    }
}

impl From<serde_json::Error> for ClockVoteError {
    fn from(err: serde_json::Error) -> Self {
        ClockVoteError::Decode(err.to_string())
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::ClockVoteError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ClockVoteError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::ClockVoteError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ClockVoteError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::ClockVoteError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ClockVoteError::Concurrency(format!($fmt, $($arg)*))
    };
}
