//! Generation job definitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ClipSummary, ClipTask, ModelError, ModelResult};

const MAX_CONCEPT_NAME_LEN: usize = 200;
const MAX_CONCEPT_DESCRIPTION_LEN: usize = 20_000;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a concept video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    NotStarted,
    Generating,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::NotStarted => "not_started",
            VideoStatus::Generating => "generating",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to generate a video for one concept.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    /// Requesting user (used for usage limits)
    pub user_id: String,

    /// Stable concept identifier (used for single-flight)
    pub concept_id: String,

    pub concept_name: String,

    pub concept_description: String,
}

impl GenerationRequest {
    pub fn new(
        user_id: impl Into<String>,
        concept_id: impl Into<String>,
        concept_name: impl Into<String>,
        concept_description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            concept_id: concept_id.into(),
            concept_name: concept_name.into(),
            concept_description: concept_description.into(),
        }
    }

    /// Validate the request.
    pub fn validate(&self) -> ModelResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(ModelError::invalid_request("User id is required"));
        }

        if self.concept_id.trim().is_empty() {
            return Err(ModelError::invalid_request("Concept id is required"));
        }

        if self.concept_name.trim().is_empty() {
            return Err(ModelError::invalid_request("Concept name is required"));
        }

        if self.concept_name.chars().count() > MAX_CONCEPT_NAME_LEN {
            return Err(ModelError::invalid_request(format!(
                "Concept name exceeds {} characters",
                MAX_CONCEPT_NAME_LEN
            )));
        }

        if self.concept_description.trim().is_empty() {
            return Err(ModelError::invalid_request("Concept description is required"));
        }

        if self.concept_description.chars().count() > MAX_CONCEPT_DESCRIPTION_LEN {
            return Err(ModelError::invalid_request(format!(
                "Concept description exceeds {} characters",
                MAX_CONCEPT_DESCRIPTION_LEN
            )));
        }

        Ok(())
    }
}

/// One concept's video generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Unique job ID
    pub id: JobId,

    /// User ID
    pub user_id: String,

    pub concept_id: String,

    pub concept_name: String,

    pub concept_description: String,

    #[serde(default)]
    pub status: VideoStatus,

    /// Scene tasks in presentation order
    #[serde(default)]
    pub clips: Vec<ClipTask>,

    /// Stitched output (set once completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    /// Timestamped log lines
    #[serde(default)]
    pub logs: Vec<String>,

    /// One caption per scene, index-aligned with `clips`
    #[serde(default)]
    pub captions: Vec<String>,

    /// Human-readable failure summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a new job from a request.
    pub fn new(request: &GenerationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: request.user_id.clone(),
            concept_id: request.concept_id.clone(),
            concept_name: request.concept_name.clone(),
            concept_description: request.concept_description.clone(),
            status: VideoStatus::NotStarted,
            clips: Vec::new(),
            video_path: None,
            logs: Vec::new(),
            captions: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// NOT_STARTED -> GENERATING.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(VideoStatus::Generating)?;
        Ok(())
    }

    /// GENERATING -> COMPLETED with the stitched video.
    pub fn complete(&mut self, video_path: PathBuf) -> ModelResult<()> {
        if !self.clips.iter().any(ClipTask::is_usable) {
            return Err(ModelError::NoRenderedClips);
        }
        self.transition(VideoStatus::Completed)?;
        self.video_path = Some(video_path);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// GENERATING -> FAILED (a job that never started may also fail).
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(VideoStatus::Failed)?;
        self.error_message = Some(error.into());
        self.video_path = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: VideoStatus) -> ModelResult<()> {
        let allowed = matches!(
            (self.status, to),
            (VideoStatus::NotStarted, VideoStatus::Generating)
                | (VideoStatus::NotStarted, VideoStatus::Failed)
                | (VideoStatus::Generating, VideoStatus::Completed)
                | (VideoStatus::Generating, VideoStatus::Failed)
        );
        if !allowed {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append an already formatted log line.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        self.updated_at = Utc::now();
    }

    /// Install planned scenes and their captions.
    pub fn set_plan(&mut self, clips: Vec<ClipTask>) {
        self.captions = clips.iter().map(|c| c.caption.clone()).collect();
        self.clips = clips;
        self.updated_at = Utc::now();
    }

    pub fn succeeded_clips(&self) -> usize {
        self.clips.iter().filter(|c| c.is_usable()).count()
    }

    /// File name of the final video, if any.
    pub fn video_file_name(&self) -> Option<String> {
        self.video_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Build the status view for observers.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: Some(self.id.clone()),
            concept_id: self.concept_id.clone(),
            video_status: self.status,
            video_path: self
                .video_file_name()
                .map(|name| format!("/api/videos/{}", name)),
            logs: self.logs.clone(),
            captions: self.captions.clone(),
            error: self.error_message.clone(),
            clips: self.clips.iter().map(ClipTask::summary).collect(),
        }
    }
}

/// Status of a concept's video as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    pub concept_id: String,

    pub video_status: VideoStatus,

    /// Accessible path of the final video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,

    pub logs: Vec<String>,

    pub captions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub clips: Vec<ClipSummary>,
}

impl JobStatusView {
    /// View for a concept that has never been generated.
    pub fn not_started(concept_id: impl Into<String>) -> Self {
        Self {
            job_id: None,
            concept_id: concept_id.into(),
            video_status: VideoStatus::NotStarted,
            video_path: None,
            logs: Vec::new(),
            captions: Vec::new(),
            error: None,
            clips: Vec::new(),
        }
    }
}
