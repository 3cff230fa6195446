//! Structured job logging.
//!
//! [`JobLogger`] writes every line to tracing with the job's context and, when
//! attached to a [`ProgressChannel`], appends it to the job's own log so
//! observers see the same narrative.

use std::sync::Arc;

use tracing::{error, info, warn, Span};

use explainer_models::JobId;

use crate::progress::ProgressChannel;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
    channel: Option<Arc<ProgressChannel>>,
}

impl JobLogger {
    /// Create a logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            channel: None,
        }
    }

    /// Forward user-facing lines to the job's progress channel.
    pub fn with_channel(mut self, channel: Arc<ProgressChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Same job and channel, different operation label.
    pub fn for_operation(&self, operation: &str) -> Self {
        Self {
            job_id: self.job_id.clone(),
            operation: operation.to_string(),
            channel: self.channel.clone(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
        self.forward(message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
        self.forward(message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
        self.forward(&format!("Warning: {}", message));
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
        self.forward(&format!("Error: {}", message));
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
        self.forward(message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Tracing span carrying the job context.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }

    fn forward(&self, line: &str) {
        if let Some(channel) = &self.channel {
            channel.log(line);
        }
    }
}
