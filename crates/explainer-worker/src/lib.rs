//! Concept video generation worker.
//!
//! This crate provides:
//! - Job orchestration with a global render pool, per-user limits and
//!   per-concept single flight
//! - Scene planning with fallbacks
//! - A batched clip pipeline with render/correct retries and narration
//! - Stitching with a closing fade
//! - Per-job progress channels and job persistence

pub mod admission;
pub mod clip_pipeline;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod processor;
pub mod progress;
pub mod registry;
pub mod stitcher;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionError, InMemoryUsageGate, UsageGate, UsageOutcome};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use orchestrator::{JobOrchestrator, JobTicket};
pub use planner::{ScenePlan, ScenePlanner};
pub use processor::{ProcessingContext, Services};
pub use progress::ProgressChannel;
pub use stitcher::{stitch_clips, StitchOutput};
pub use store::{InMemoryJobStore, JobStore, JsonFileJobStore};
