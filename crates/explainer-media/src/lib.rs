//! Media process wrappers for concept video generation.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution
//! - FFprobe duration probing
//! - Audio/video duration reconciliation
//! - Clip concatenation and closing fade
//! - Manim scene rendering in isolated processes
//! - Command-line speech synthesis

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod muxer;
pub mod probe;
pub mod process;
pub mod reconcile;
pub mod render;
pub mod speech;
pub mod stitch;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{file_size, move_file};
pub use muxer::{FfmpegMuxer, MediaMuxer};
pub use probe::{get_duration, probe_media, MediaInfo};
pub use process::{check_program, run_process, ProcessOutput};
pub use reconcile::{plan_reconciliation, reconcile_clip, ReconcileOutcome, ReconcilePlan};
pub use render::{ManimRenderer, RenderConfig, SceneRenderer};
pub use speech::{CommandSpeechSynthesizer, SpeechConfig, SpeechSynthesizer};
pub use stitch::FADE_WINDOW_SECS;
