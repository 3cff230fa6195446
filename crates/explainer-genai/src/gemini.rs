//! Gemini REST client.
//!
//! Calls `models/{model}:generateContent` and returns the concatenated text
//! of the first candidate. Overload and quota failures are retried with
//! exponential backoff before the error is surfaced; calls are spaced by a
//! minimum interval shared across all users of the client.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GenAiError, GenAiResult};
use crate::retry::{retry_async, RetryConfig, RetryResult};
use crate::TextGenerator;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

type CallLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Retries after the first attempt, for transient failures only
    pub max_retries: u32,
    /// Base backoff; doubles per retry
    pub retry_base_delay: Duration,
    /// Minimum spacing between calls (zero disables)
    pub min_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            min_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl GeminiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        let defaults = Self::default();
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAiError::config("GEMINI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            max_retries: std::env::var("GEMINI_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
            min_interval: std::env::var("GEMINI_MIN_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            request_timeout: defaults.request_timeout,
        })
    }
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
    limiter: Option<Arc<CallLimiter>>,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(config: GeminiConfig) -> GenAiResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GenAiError::config("Gemini API key is empty"));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;
        let limiter = min_interval_limiter(config.min_interval);

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> GenAiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Single API call without retries.
    async fn call_gemini_api(&self, prompt: &str, temperature: f32) -> GenAiResult<String> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        debug!(model = %self.config.model, prompt_chars = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::api(status.as_u16(), api_error_message(&body)));
        }

        let body: GeminiResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenAiError::EmptyResponse);
        }
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> GenAiResult<String> {
        let retry = RetryConfig::new("gemini_generate")
            .with_max_retries(self.config.max_retries)
            .with_base_delay(self.config.retry_base_delay);

        match retry_async(&retry, GenAiError::is_transient, || {
            self.call_gemini_api(prompt, temperature)
        })
        .await
        {
            RetryResult::Success(text) => Ok(text),
            RetryResult::Failed { error, attempts } => {
                info!(attempts, error = %error, "Gemini call failed");
                Err(error)
            }
        }
    }
}

fn min_interval_limiter(interval: Duration) -> Option<Arc<CallLimiter>> {
    let quota = Quota::with_period(interval)?.allow_burst(NonZeroU32::MIN);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Human-readable message from an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error.status.is_empty() => {
            format!("{} ({})", parsed.error.message, parsed.error.status)
        }
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}
