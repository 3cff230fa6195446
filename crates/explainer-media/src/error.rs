//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Render failed: {message}")]
    RenderFailed { message: String, output: String },

    #[error("Could not find the rendered video file after a successful render: {0}")]
    ArtifactNotFound(String),

    #[error("Speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a render failure carrying the engine's captured output.
    pub fn render_failed(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::RenderFailed {
            message: message.into(),
            output: output.into(),
        }
    }

    pub fn speech_failed(message: impl Into<String>) -> Self {
        Self::SpeechFailed(message.into())
    }

    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Text handed back to code correction after a failed render.
    pub fn feedback_text(&self) -> String {
        match self {
            MediaError::RenderFailed { output, .. } if !output.trim().is_empty() => output.clone(),
            MediaError::FfmpegFailed {
                stderr: Some(stderr),
                ..
            } => stderr.clone(),
            other => other.to_string(),
        }
    }
}
