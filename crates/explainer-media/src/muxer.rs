//! Media multiplexer abstraction and its FFmpeg implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{get_duration, probe_media};
use crate::reconcile::ReconcilePlan;
use crate::stitch::{audio_fade_filter, video_fade_filter, write_concat_list};

const SILENT_AUDIO_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Combines, loops, trims and fades media files.
#[async_trait]
pub trait MediaMuxer: Send + Sync {
    /// Length of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Merge `audio` into `video` according to `plan`.
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        plan: &ReconcilePlan,
        output: &Path,
    ) -> MediaResult<PathBuf>;

    /// Concatenate `inputs` in order.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<PathBuf>;

    /// Fade video to black and audio to silence from `start` for `duration` seconds.
    async fn fade_out(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> MediaResult<PathBuf>;
}

/// [`MediaMuxer`] backed by the ffmpeg and ffprobe CLIs.
#[derive(Debug, Clone, Default)]
pub struct FfmpegMuxer {
    runner: FfmpegRunner,
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a timeout to every ffmpeg invocation.
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(secs),
        }
    }

    /// Build the ffmpeg command for a reconciliation plan.
    pub fn merge_command(video: &Path, audio: &Path, plan: &ReconcilePlan, output: &Path) -> FfmpegCommand {
        match plan {
            ReconcilePlan::Shortest => FfmpegCommand::new(output)
                .input(video)
                .input(audio)
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("copy")
                .aac()
                .shortest(),
            ReconcilePlan::FreezeLastFrame {
                pad_secs,
                target_secs,
            } => FfmpegCommand::new(output)
                .input(video)
                .input(audio)
                .filter_complex(format!(
                    "[0:v]tpad=stop_mode=clone:stop_duration={:.3}[v]",
                    pad_secs
                ))
                .map("[v]")
                .map("1:a:0")
                .h264()
                .aac()
                .duration(*target_secs),
            ReconcilePlan::LoopAudio { target_secs } => FfmpegCommand::new(output)
                .input(video)
                .looped_input(audio)
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("copy")
                .aac()
                .duration(*target_secs),
            ReconcilePlan::Direct { .. } => FfmpegCommand::new(output)
                .input(video)
                .input(audio)
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("copy")
                .aac(),
        }
    }

    /// Give silent clips an empty audio track so a mixed list concatenates.
    async fn align_audio_tracks(&self, inputs: &[PathBuf], scratch: &Path) -> MediaResult<Vec<PathBuf>> {
        let mut with_audio = Vec::with_capacity(inputs.len());
        for input in inputs {
            with_audio.push(probe_media(input).await?.has_audio);
        }

        if with_audio.iter().all(|a| *a) || with_audio.iter().all(|a| !*a) {
            return Ok(inputs.to_vec());
        }

        let mut aligned = Vec::with_capacity(inputs.len());
        for (i, (input, has_audio)) in inputs.iter().zip(with_audio).enumerate() {
            if has_audio {
                aligned.push(input.clone());
                continue;
            }
            let padded = scratch.join(format!("silent_{}.mp4", i));
            let cmd = FfmpegCommand::new(&padded)
                .input(input)
                .lavfi_input(SILENT_AUDIO_SOURCE)
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("copy")
                .aac()
                .shortest();
            debug!(input = %input.display(), "Adding silent track before concat");
            aligned.push(self.runner.run(&cmd).await?);
        }
        Ok(aligned)
    }
}

#[async_trait]
impl MediaMuxer for FfmpegMuxer {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(path).await
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        plan: &ReconcilePlan,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        let cmd = Self::merge_command(video, audio, plan, output);
        self.runner.run(&cmd).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        if inputs.is_empty() {
            return Err(MediaError::internal("Nothing to concatenate"));
        }

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let scratch = TempDir::new_in(parent)?;

        let aligned = self.align_audio_tracks(inputs, scratch.path()).await?;
        // Concat lists resolve relative entries against the list's own directory.
        let mut absolute = Vec::with_capacity(aligned.len());
        for path in &aligned {
            absolute.push(tokio::fs::canonicalize(path).await?);
        }
        let list = write_concat_list(&absolute, output)?;

        let cmd = FfmpegCommand::new(output)
            .input_with_args(["-f", "concat", "-safe", "0"], list.path().to_string_lossy())
            .h264()
            .aac();

        info!(clips = inputs.len(), output = %output.display(), "Concatenating clips");
        self.runner.run(&cmd).await
    }

    async fn fade_out(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        let info = probe_media(input).await?;

        let mut cmd = FfmpegCommand::new(output)
            .input(input)
            .video_filter(video_fade_filter(start, duration))
            .h264();
        if info.has_audio {
            cmd = cmd.audio_filter(audio_fade_filter(start, duration)).aac();
        }

        self.runner.run(&cmd).await
    }
}
