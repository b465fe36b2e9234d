//! Service-side error taxonomy carried inside `ActionResponse`.
//!
//! Everything that goes wrong while a service handles a request is folded
//! into one of these and sent back through the normal reply path. The
//! dispatch loop itself never dies on a bad message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a service-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The message body was not a well-formed request.
    Decode,
    /// No handler registered for the `(controller, action)` pair.
    NotFound,
    /// The handler rejected the argument list (missing, extra, wrong shape).
    InvalidArgument,
    /// The handler ran and failed.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decode => "decode",
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error payload of an [`ActionResponse`](crate::ActionResponse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub message: String,
    pub kind: ErrorKind,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Malformed request body.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Unknown `(controller, action)` pair.
    pub fn not_found(controller: &str, action: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("action not found: {controller}.{action}"),
        )
    }

    /// Argument list did not match what the handler expects.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Handler-reported failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}
