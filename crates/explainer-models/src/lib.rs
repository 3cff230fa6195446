//! Shared data models for the concept video orchestrator.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their lifecycle
//! - Per-scene clip tasks
//! - Progress and log events
//! - Status and usage views exposed to observers

pub mod clip;
pub mod error;
pub mod events;
pub mod job;
pub mod usage;

// Re-export common types
pub use clip::{ClipState, ClipSummary, ClipTask, MAX_RENDER_ATTEMPTS};
pub use error::{ModelError, ModelResult};
pub use events::{format_log_line, JobEvent, ProgressUpdate, Stage};
pub use job::{GenerationJob, GenerationRequest, JobId, JobStatusView, VideoStatus};
pub use usage::UsageStats;
