//! Model-level errors.

use thiserror::Error;

use crate::VideoStatus;

/// Errors raised when a model transition or request is invalid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: VideoStatus,
        to: VideoStatus,
    },

    #[error("Cannot complete a job without any rendered clip")]
    NoRenderedClips,

    #[error("Clip {index} exhausted its {max} render attempts")]
    AttemptsExhausted { index: usize, max: u8 },
}

impl ModelError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
