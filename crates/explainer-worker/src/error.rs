//! Worker error types.

use std::any::Any;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("No clips rendered successfully out of {total}")]
    NoUsableClips { total: usize },

    #[error("Only {succeeded} of {total} clips rendered (need {required:.0}%)")]
    InsufficientClips {
        succeeded: usize,
        total: usize,
        required: f64,
    },

    #[error("Stitching failed: {0}")]
    StitchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Media error: {0}")]
    Media(#[from] explainer_media::MediaError),

    #[error("Generation error: {0}")]
    GenAi(#[from] explainer_genai::GenAiError),

    #[error("Model error: {0}")]
    Model(#[from] explainer_models::ModelError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn stitch_failed(msg: impl Into<String>) -> Self {
        Self::StitchFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
