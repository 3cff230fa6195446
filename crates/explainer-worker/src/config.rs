//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use explainer_models::MAX_RENDER_ATTEMPTS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs allowed inside the render phase at once (global permit pool)
    pub max_concurrent_jobs: usize,
    /// Clips rendered concurrently within one job
    pub batch_size: usize,
    /// Render attempts per clip, capped at 3
    pub max_render_attempts: u8,
    /// Scratch space; each job gets `{work_dir}/{job_id}`
    pub work_dir: PathBuf,
    /// Where finished videos are published
    pub videos_dir: PathBuf,
    /// Where job records are persisted
    pub jobs_dir: PathBuf,
    /// Jobs a user may start per rolling 24 hours
    pub daily_limit: u32,
    /// Jobs a user may have generating at once
    pub max_generating_per_user: u32,
    /// Closing fade length in seconds
    pub fade_secs: f64,
    /// Fraction of clips that must succeed for COMPLETED (0 = any one clip)
    pub min_success_ratio: f64,
    pub scene_temperature: f32,
    pub narration_temperature: f32,
    pub code_temperature: f32,
    /// Buffered events per job before slow observers start lagging
    pub event_buffer: usize,
    /// Keep per-job scratch files after the job finishes
    pub keep_work_files: bool,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let work_dir = PathBuf::from("/tmp/explainer");
        Self {
            max_concurrent_jobs: 2,
            batch_size: 3,
            max_render_attempts: MAX_RENDER_ATTEMPTS,
            jobs_dir: work_dir.join("jobs"),
            work_dir,
            videos_dir: PathBuf::from("videos"),
            daily_limit: 5,
            max_generating_per_user: 3,
            fade_secs: 1.0,
            min_success_ratio: 0.0,
            scene_temperature: 0.3,
            narration_temperature: 0.7,
            code_temperature: 0.2,
            event_buffer: 256,
            keep_work_files: false,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let work_dir = std::env::var("WORKER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs)
                .max(1),
            batch_size: env_parse("WORKER_BATCH_SIZE")
                .unwrap_or(defaults.batch_size)
                .max(1),
            max_render_attempts: env_parse("WORKER_MAX_RENDER_ATTEMPTS")
                .unwrap_or(defaults.max_render_attempts)
                .clamp(1, MAX_RENDER_ATTEMPTS),
            jobs_dir: std::env::var("WORKER_JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| work_dir.join("jobs")),
            work_dir,
            videos_dir: std::env::var("WORKER_VIDEOS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.videos_dir),
            daily_limit: env_parse("WORKER_DAILY_LIMIT").unwrap_or(defaults.daily_limit),
            max_generating_per_user: env_parse("WORKER_MAX_GENERATING_PER_USER")
                .unwrap_or(defaults.max_generating_per_user),
            fade_secs: env_parse("WORKER_FADE_SECS").unwrap_or(defaults.fade_secs),
            min_success_ratio: env_parse("WORKER_MIN_SUCCESS_RATIO")
                .unwrap_or(defaults.min_success_ratio)
                .clamp(0.0, 1.0),
            scene_temperature: env_parse("WORKER_SCENE_TEMPERATURE")
                .unwrap_or(defaults.scene_temperature),
            narration_temperature: env_parse("WORKER_NARRATION_TEMPERATURE")
                .unwrap_or(defaults.narration_temperature),
            code_temperature: env_parse("WORKER_CODE_TEMPERATURE")
                .unwrap_or(defaults.code_temperature),
            event_buffer: env_parse("WORKER_EVENT_BUFFER")
                .unwrap_or(defaults.event_buffer)
                .max(1),
            keep_work_files: env_parse("WORKER_KEEP_WORK_FILES").unwrap_or(defaults.keep_work_files),
            shutdown_timeout: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(60),
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_render_attempts, 3);
        assert_eq!(config.daily_limit, 5);
        assert_eq!(config.max_generating_per_user, 3);
        assert_eq!(config.min_success_ratio, 0.0);
        assert_eq!(config.jobs_dir, PathBuf::from("/tmp/explainer/jobs"));
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        assert_eq!(env_parse::<u32>("EXPLAINER_TEST_UNSET_VARIABLE"), None);
    }
}
