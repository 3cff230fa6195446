//! Progress and log events.
//!
//! Events are append-only: once published they are never mutated.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::VideoStatus;

/// Pipeline stage a progress update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Breaking the concept into scenes
    Splitting,
    /// Requesting renderable code for a scene
    GeneratingCode,
    /// Running the rendering engine
    Rendering,
    /// Concatenating clips into the final video
    Stitching,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Splitting => "splitting",
            Stage::GeneratingCode => "generating_code",
            Stage::Rendering => "rendering",
            Stage::Stitching => "stitching",
        }
    }
}

/// Structured progress for one step of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub stage: Stage,
    pub detail: String,
    /// `current / total` as 0-100
    pub percent: u8,
}

impl ProgressUpdate {
    pub fn new(current: usize, total: usize, stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            current,
            total,
            stage,
            detail: detail.into(),
            percent: percent_of(current, total),
        }
    }
}

fn percent_of(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current.min(total) * 100) / total;
    pct as u8
}

/// Event carried on a job's progress channel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Timestamped free-text log line
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress update
    Progress(ProgressUpdate),

    /// Status change
    Status {
        status: VideoStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        video_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl JobEvent {
    /// Create a log event; the message is stored as `[HH:MM:SS] message`.
    pub fn log(message: impl AsRef<str>) -> Self {
        let now = Utc::now();
        JobEvent::Log {
            message: format_log_line(now, message.as_ref()),
            timestamp: now,
        }
    }

    pub fn progress(update: ProgressUpdate) -> Self {
        JobEvent::Progress(update)
    }

    pub fn status(status: VideoStatus, video_path: Option<String>, error: Option<String>) -> Self {
        JobEvent::Status {
            status,
            video_path,
            error,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            JobEvent::Log { .. } => "log",
            JobEvent::Progress(_) => "progress",
            JobEvent::Status { .. } => "status",
        }
    }
}

/// Format a log line as stored in job logs.
pub fn format_log_line(at: DateTime<Utc>, message: &str) -> String {
    format!("[{}] {}", at.format("%H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percent() {
        assert_eq!(ProgressUpdate::new(1, 4, Stage::Rendering, "").percent, 25);
        assert_eq!(ProgressUpdate::new(4, 4, Stage::Stitching, "").percent, 100);
        assert_eq!(ProgressUpdate::new(0, 0, Stage::Splitting, "").percent, 0);
        assert_eq!(ProgressUpdate::new(9, 4, Stage::Rendering, "").percent, 100);
    }

    #[test]
    fn test_log_line_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
        assert_eq!(format_log_line(at, "Scene split done"), "[09:03:07] Scene split done");
    }

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::progress(ProgressUpdate::new(2, 5, Stage::GeneratingCode, "scene 2"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "generating_code");
        assert_eq!(json["percent"], 40);

        let log = JobEvent::log("hello");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["type"], "log");
        assert!(json["message"].as_str().unwrap().ends_with("] hello"));
    }
}
