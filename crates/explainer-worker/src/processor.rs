//! Service wiring and the per-job processing context.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use explainer_genai::{GeminiClient, TextGenerator};
use explainer_media::{
    CommandSpeechSynthesizer, FfmpegMuxer, ManimRenderer, MediaMuxer, RenderConfig,
    SceneRenderer, SpeechConfig, SpeechSynthesizer,
};
use explainer_models::ClipTask;
use tracing::error;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::progress::ProgressChannel;
use crate::store::JobStore;

/// External services a job talks to.
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<dyn TextGenerator>,
    pub renderer: Arc<dyn SceneRenderer>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub muxer: Arc<dyn MediaMuxer>,
}

impl Services {
    /// Gemini, Manim, command-line TTS and FFmpeg, configured from the environment.
    pub fn from_env() -> WorkerResult<Self> {
        let render_config = RenderConfig::from_env();
        let muxer_timeout = render_config.timeout_secs;

        Ok(Self {
            generator: Arc::new(GeminiClient::from_env()?),
            renderer: Arc::new(ManimRenderer::new(render_config)),
            speech: Arc::new(CommandSpeechSynthesizer::new(SpeechConfig::from_env())),
            muxer: Arc::new(FfmpegMuxer::with_timeout(muxer_timeout)),
        })
    }
}

/// Everything a running job's pipeline stages share.
pub struct ProcessingContext {
    pub config: Arc<WorkerConfig>,
    pub services: Services,
    pub channel: Arc<ProgressChannel>,
    pub logger: JobLogger,
    /// `{work_dir}/{job_id}`
    pub job_dir: PathBuf,
    store: Option<Arc<dyn JobStore>>,
    clips_done: AtomicUsize,
}

impl ProcessingContext {
    pub fn new(
        config: Arc<WorkerConfig>,
        services: Services,
        channel: Arc<ProgressChannel>,
    ) -> Self {
        let job_dir = config.work_dir.join(channel.job_id().as_str());
        let logger = JobLogger::new(channel.job_id(), "video_generation").with_channel(channel.clone());
        Self {
            config,
            services,
            channel,
            logger,
            job_dir,
            store: None,
            clips_done: AtomicUsize::new(0),
        }
    }

    /// Persist the job record through `store` at each checkpoint.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Write the current job record. Returns `false` if the write failed.
    pub async fn persist(&self) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        match store.save(&self.channel.snapshot()).await {
            Ok(()) => true,
            Err(e) => {
                error!(job_id = %self.channel.job_id(), error = %e, "Failed to persist job");
                false
            }
        }
    }

    /// Record a clip that reached a terminal state in the live job.
    ///
    /// Returns how many clips of this job have finished so far.
    pub fn finish_clip(&self, task: &ClipTask) -> usize {
        self.channel.update(|job| {
            if let Some(slot) = job.clips.iter_mut().find(|c| c.index == task.index) {
                *slot = task.clone();
            }
        });
        self.clips_done.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Clips of this job that have reached a terminal state.
    pub fn clips_done(&self) -> usize {
        self.clips_done.load(Ordering::SeqCst)
    }

    /// Per-clip renders, narration and merges.
    pub fn clips_dir(&self) -> PathBuf {
        self.job_dir.join("clips")
    }
}
