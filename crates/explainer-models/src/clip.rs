//! Per-scene clip task model.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult};

/// Hard ceiling on render attempts for a single clip.
pub const MAX_RENDER_ATTEMPTS: u8 = 3;

/// Terminal and non-terminal states of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipState {
    /// Clip has not reached a terminal state yet
    #[default]
    Pending,
    /// Clip rendered and has a usable artifact
    Succeeded,
    /// Clip exhausted its attempts or crashed
    Failed,
}

impl ClipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipState::Pending => "pending",
            ClipState::Succeeded => "succeeded",
            ClipState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClipState::Pending)
    }
}

/// One scene of a generation job.
///
/// `index` fixes the presentation order and is never reassigned. The
/// `rendered` flag and `media_path` are only ever set together through
/// [`ClipTask::mark_rendered`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipTask {
    /// Position of the scene in the final video (0-based)
    pub index: usize,

    /// Scene description produced by the planner
    pub scene_description: String,

    /// Viewer-facing caption for the scene
    pub caption: String,

    /// Render attempts consumed so far
    #[serde(default)]
    pub attempts: u8,

    /// Error text from the most recent failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Whether a render attempt produced an artifact
    #[serde(default)]
    pub rendered: bool,

    /// Final artifact for this clip (merged with narration when available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<PathBuf>,

    /// Synthesized narration track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_path: Option<PathBuf>,

    #[serde(default)]
    pub state: ClipState,
}

impl ClipTask {
    /// Create a pending task for a scene.
    pub fn new(index: usize, scene_description: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            index,
            scene_description: scene_description.into(),
            caption: caption.into(),
            attempts: 0,
            last_error: None,
            rendered: false,
            media_path: None,
            narration_path: None,
            state: ClipState::Pending,
        }
    }

    /// Consume one render attempt, returning the 1-based attempt number.
    ///
    /// Fails once `max` (itself capped at [`MAX_RENDER_ATTEMPTS`]) attempts
    /// have been used.
    pub fn begin_attempt(&mut self, max: u8) -> ModelResult<u8> {
        let max = max.clamp(1, MAX_RENDER_ATTEMPTS);
        if self.attempts >= max {
            return Err(ModelError::AttemptsExhausted {
                index: self.index,
                max,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Record a failed attempt without changing the terminal state.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Mark the clip as rendered with its artifact.
    pub fn mark_rendered(&mut self, media_path: PathBuf) {
        self.rendered = true;
        self.media_path = Some(media_path);
        self.state = ClipState::Succeeded;
    }

    /// Swap the artifact of an already rendered clip (e.g. after merging narration).
    pub fn replace_media(&mut self, media_path: PathBuf) {
        if self.rendered {
            self.media_path = Some(media_path);
        }
    }

    /// Mark the clip as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.rendered = false;
        self.media_path = None;
        self.state = ClipState::Failed;
    }

    /// Whether the clip can be stitched.
    pub fn is_usable(&self) -> bool {
        self.rendered && self.media_path.is_some()
    }

    /// Output filename for the raw render.
    pub fn render_filename(&self) -> String {
        format!("clip_{}.mp4", self.index)
    }

    /// Output filename for the narrated render.
    pub fn merged_filename(&self) -> String {
        format!("clip_{}_final.mp4", self.index)
    }

    /// Output filename for the narration track.
    pub fn narration_filename(&self) -> String {
        format!("narration_{}.mp3", self.index)
    }

    pub fn summary(&self) -> ClipSummary {
        ClipSummary {
            index: self.index,
            caption: self.caption.clone(),
            state: self.state,
            attempts: self.attempts,
            has_narration: self.narration_path.is_some(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Compact per-clip view for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClipSummary {
    pub index: usize,
    pub caption: String,
    pub state: ClipState,
    pub attempts: u8,
    pub has_narration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_never_exceed_ceiling() {
        let mut task = ClipTask::new(0, "A circle grows", "Growth");

        assert_eq!(task.begin_attempt(3).unwrap(), 1);
        assert_eq!(task.begin_attempt(3).unwrap(), 2);
        assert_eq!(task.begin_attempt(3).unwrap(), 3);
        assert!(task.begin_attempt(3).is_err());
        assert_eq!(task.attempts, 3);
    }

    #[test]
    fn test_configured_max_is_capped() {
        let mut task = ClipTask::new(1, "Scene", "Caption");
        for _ in 0..3 {
            task.begin_attempt(10).unwrap();
        }
        assert!(matches!(
            task.begin_attempt(10),
            Err(ModelError::AttemptsExhausted { index: 1, max: 3 })
        ));
    }

    #[test]
    fn test_rendered_implies_media_path() {
        let mut task = ClipTask::new(2, "Scene", "Caption");
        assert!(!task.is_usable());

        task.mark_rendered(PathBuf::from("/tmp/clip_2.mp4"));
        assert!(task.rendered);
        assert_eq!(task.media_path.as_deref(), Some(std::path::Path::new("/tmp/clip_2.mp4")));
        assert_eq!(task.state, ClipState::Succeeded);

        task.mark_failed("boom");
        assert!(!task.rendered);
        assert!(task.media_path.is_none());
        assert_eq!(task.state, ClipState::Failed);
    }

    #[test]
    fn test_replace_media_ignored_when_not_rendered() {
        let mut task = ClipTask::new(0, "Scene", "Caption");
        task.replace_media(PathBuf::from("/tmp/x.mp4"));
        assert!(task.media_path.is_none());
    }

    #[test]
    fn test_filenames() {
        let task = ClipTask::new(4, "Scene", "Caption");
        assert_eq!(task.render_filename(), "clip_4.mp4");
        assert_eq!(task.merged_filename(), "clip_4_final.mp4");
        assert_eq!(task.narration_filename(), "narration_4.mp3");
    }
}
