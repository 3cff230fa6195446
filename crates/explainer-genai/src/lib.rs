//! Text and code generation for concept videos.
//!
//! This crate provides:
//! - The [`TextGenerator`] service boundary
//! - A Gemini REST implementation with transient-error backoff
//! - Prompt templates for planning, narration and scene code
//! - Cleanup of model output into renderable source and plain prose

pub mod error;
pub mod gemini;
pub mod prompts;
pub mod retry;
pub mod text;

use async_trait::async_trait;

pub use error::{GenAiError, GenAiResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use retry::{retry_async, RetryConfig, RetryResult};
pub use text::{clean_prose, extract_scene_source};

/// Prompt in, text out.
///
/// Implementations absorb transient failures themselves; an error returned
/// here has already exhausted any service-level retries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> GenAiResult<String>;
}
