//! Audio/video duration reconciliation.
//!
//! Rendered scenes are paced by their animation while narration is paced by
//! speech, so the two rarely match. [`plan_reconciliation`] decides how to
//! merge them so neither content nor speech is cut off, and
//! [`reconcile_clip`] carries the plan out through a [`MediaMuxer`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MediaResult;
use crate::muxer::MediaMuxer;

/// Durations closer than this are treated as equal.
pub const DURATION_TOLERANCE_SECS: f64 = 0.05;

/// How a video and its narration are merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcilePlan {
    /// A duration is unknown; stop at the end of the shorter stream.
    Shortest,
    /// Video is shorter: hold its final frame for `pad_secs`.
    FreezeLastFrame { pad_secs: f64, target_secs: f64 },
    /// Audio is shorter: repeat it and cut at `target_secs`.
    LoopAudio { target_secs: f64 },
    /// Durations already match.
    Direct { duration_secs: f64 },
}

impl ReconcilePlan {
    /// Duration of the merged clip, when it is known up front.
    pub fn target_secs(&self) -> Option<f64> {
        match self {
            ReconcilePlan::Shortest => None,
            ReconcilePlan::FreezeLastFrame { target_secs, .. } => Some(*target_secs),
            ReconcilePlan::LoopAudio { target_secs } => Some(*target_secs),
            ReconcilePlan::Direct { duration_secs } => Some(*duration_secs),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePlan::Shortest => "shortest",
            ReconcilePlan::FreezeLastFrame { .. } => "freeze_last_frame",
            ReconcilePlan::LoopAudio { .. } => "loop_audio",
            ReconcilePlan::Direct { .. } => "direct",
        }
    }
}

/// Decide how to merge a video of `video_secs` with audio of `audio_secs`.
pub fn plan_reconciliation(video_secs: Option<f64>, audio_secs: Option<f64>) -> ReconcilePlan {
    let usable = |d: Option<f64>| d.filter(|v| v.is_finite() && *v > 0.0);

    let (Some(video), Some(audio)) = (usable(video_secs), usable(audio_secs)) else {
        return ReconcilePlan::Shortest;
    };

    if (video - audio).abs() <= DURATION_TOLERANCE_SECS {
        ReconcilePlan::Direct {
            duration_secs: video,
        }
    } else if video < audio {
        ReconcilePlan::FreezeLastFrame {
            pad_secs: audio - video,
            target_secs: audio,
        }
    } else {
        ReconcilePlan::LoopAudio { target_secs: video }
    }
}

/// Result of merging narration into a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub path: PathBuf,
    pub plan: ReconcilePlan,
}

/// Probe both inputs, plan the merge and write it to `output`.
///
/// A probe failure is not an error: the merge falls back to
/// [`ReconcilePlan::Shortest`].
pub async fn reconcile_clip(
    muxer: &dyn MediaMuxer,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> MediaResult<ReconcileOutcome> {
    let video_secs = probe_or_none(muxer, video).await;
    let audio_secs = probe_or_none(muxer, audio).await;

    let plan = plan_reconciliation(video_secs, audio_secs);
    debug!(
        video = ?video_secs,
        audio = ?audio_secs,
        plan = plan.as_str(),
        "Reconciling narration"
    );

    let path = muxer.merge(video, audio, &plan, output).await?;
    Ok(ReconcileOutcome { path, plan })
}

async fn probe_or_none(muxer: &dyn MediaMuxer, path: &Path) -> Option<f64> {
    match muxer.probe_duration(path).await {
        Ok(secs) => Some(secs),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Duration probe failed");
            None
        }
    }
}
