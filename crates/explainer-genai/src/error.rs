//! Error types for text generation.

use thiserror::Error;

/// Result type for generation calls.
pub type GenAiResult<T> = Result<T, GenAiError>;

/// Message fragments the API uses for overload and quota conditions.
const TRANSIENT_SIGNALS: &[&str] = &["503", "unavailable", "rate limit", "quota", "overloaded"];

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenAiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure is an overload/quota condition worth backing off for.
    pub fn is_transient(&self) -> bool {
        match self {
            GenAiError::Api { status, message } => {
                matches!(status, 429 | 500 | 502 | 503 | 504) || has_transient_signal(message)
            }
            GenAiError::Http(e) => e.is_timeout() || e.is_connect() || has_transient_signal(&e.to_string()),
            _ => false,
        }
    }
}

fn has_transient_signal(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNALS.iter().any(|s| lower.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenAiError::api(503, "Service Unavailable").is_transient());
        assert!(GenAiError::api(429, "Too Many Requests").is_transient());
        assert!(GenAiError::api(400, "Quota exceeded for metric").is_transient());
        assert!(GenAiError::api(400, "The model is overloaded").is_transient());

        assert!(!GenAiError::api(400, "Invalid argument").is_transient());
        assert!(!GenAiError::api(403, "API key not valid").is_transient());
        assert!(!GenAiError::EmptyResponse.is_transient());
        assert!(!GenAiError::config("missing key").is_transient());
    }
}
