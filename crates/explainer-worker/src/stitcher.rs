//! Stitching: successful clips, in scene order, into one faded video.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use explainer_media::stitch::fade_start;
use explainer_media::{move_file, MediaMuxer};
use explainer_models::ClipTask;

use crate::error::{WorkerError, WorkerResult};

/// Result of a successful stitch.
#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub path: PathBuf,
    /// Scene indices included, in playback order
    pub clip_indices: Vec<usize>,
    pub duration_secs: Option<f64>,
    pub faded: bool,
}

/// Concatenate the usable clips and apply the closing fade.
///
/// Fails only when no clip is usable or concatenation itself fails. A probe
/// or fade failure publishes the unfaded concatenation instead.
pub async fn stitch_clips(
    muxer: &dyn MediaMuxer,
    clips: &[ClipTask],
    work_dir: &Path,
    final_path: &Path,
    fade_secs: f64,
) -> WorkerResult<StitchOutput> {
    let mut usable: Vec<&ClipTask> = clips.iter().filter(|c| c.is_usable()).collect();
    if usable.is_empty() {
        return Err(WorkerError::NoUsableClips { total: clips.len() });
    }
    usable.sort_by_key(|c| c.index);

    let clip_indices: Vec<usize> = usable.iter().map(|c| c.index).collect();
    let inputs: Vec<PathBuf> = usable
        .iter()
        .filter_map(|c| c.media_path.clone())
        .collect();

    tokio::fs::create_dir_all(work_dir).await?;
    let concatenated = muxer
        .concat(&inputs, &work_dir.join("concatenated.mp4"))
        .await
        .map_err(|e| WorkerError::stitch_failed(e.to_string()))?;

    let duration_secs = match muxer.probe_duration(&concatenated).await {
        Ok(secs) => Some(secs),
        Err(e) => {
            warn!(error = %e, "Could not probe stitched video; skipping fade");
            None
        }
    };

    let mut published = concatenated.clone();
    let mut faded = false;
    if let Some(start) = duration_secs.and_then(|d| fade_start(d, fade_secs)) {
        match muxer
            .fade_out(&concatenated, start, fade_secs, &work_dir.join("faded.mp4"))
            .await
        {
            Ok(path) => {
                published = path;
                faded = true;
            }
            Err(e) => warn!(error = %e, "Fade failed; publishing unfaded video"),
        }
    }

    move_file(&published, final_path).await?;
    info!(
        clips = clip_indices.len(),
        duration = ?duration_secs,
        faded,
        output = %final_path.display(),
        "Stitched final video"
    );

    Ok(StitchOutput {
        path: final_path.to_path_buf(),
        clip_indices,
        duration_secs,
        faded,
    })
}
