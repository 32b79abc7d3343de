//! Wire messages exchanged over an RPC channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One frame on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// A correlated call; the peer answers with a [`Message::Response`] carrying the same id.
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },
    /// Fire-and-forget.
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

impl Message {
    pub fn reply(id: u64, outcome: Result<Value, RemoteError>) -> Self {
        match outcome {
            Ok(result) => Message::Response {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Message::Response {
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Category of a failure reported by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MethodNotFound,
    InvalidParams,
    Internal,
}

/// Error returned by the remote side of a call. Serializable so it can cross the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code:?})")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: ErrorCode::MethodNotFound,
            message: format!("method `{method}` is not registered"),
        }
    }

    pub fn invalid_params(error: impl std::fmt::Display) -> Self {
        Self {
            code: ErrorCode::InvalidParams,
            message: error.to_string(),
        }
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: error.to_string(),
        }
    }
}
