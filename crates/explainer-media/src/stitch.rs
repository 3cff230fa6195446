//! Concatenation list and closing fade helpers.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::MediaResult;

/// Length of the closing fade to black and silence.
pub const FADE_WINDOW_SECS: f64 = 1.0;

/// Quote a path for an ffmpeg concat list (`'` becomes `'\''`).
pub fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Contents of a concat demuxer list for `paths`, in order.
pub fn concat_list_contents(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", escape_concat_path(p)))
        .collect()
}

/// Write a concat list next to `output`.
///
/// The list is deleted when the returned handle is dropped.
pub fn write_concat_list(paths: &[PathBuf], output: &Path) -> MediaResult<NamedTempFile> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut list = tempfile::Builder::new()
        .prefix("concat_")
        .suffix(".txt")
        .tempfile_in(dir)?;
    list.write_all(concat_list_contents(paths).as_bytes())?;
    list.flush()?;
    Ok(list)
}

/// Start of the closing fade, or `None` when the video is shorter than the window.
pub fn fade_start(total_secs: f64, window_secs: f64) -> Option<f64> {
    if !total_secs.is_finite() || window_secs <= 0.0 || total_secs < window_secs {
        return None;
    }
    Some(total_secs - window_secs)
}

pub fn video_fade_filter(start: f64, duration: f64) -> String {
    format!("fade=t=out:st={:.3}:d={:.3}", start, duration)
}

pub fn audio_fade_filter(start: f64, duration: f64) -> String {
    format!("afade=t=out:st={:.3}:d={:.3}", start, duration)
}
