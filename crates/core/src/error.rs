//! Core error model.

use thiserror::Error;

/// Result type used for core primitives.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing core primitives.
///
/// These are input-validation failures only. Runtime delivery problems
/// (failing callbacks, missing transports) are never surfaced as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An event name was empty or otherwise unusable.
    #[error("invalid event name: {0}")]
    InvalidEventName(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_event_name(msg: impl Into<String>) -> Self {
        Self::InvalidEventName(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
