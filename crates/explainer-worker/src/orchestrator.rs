//! Job orchestration.
//!
//! A submission passes three gates before any work starts: the concept must
//! not already be generating, and the user must be under both the daily and
//! the concurrent limit. Admitted jobs run in their own task and wait for a
//! slot in the global render pool before planning. Whatever happens inside,
//! the job ends COMPLETED or FAILED and every claim it took is given back.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use explainer_models::{
    GenerationJob, GenerationRequest, JobEvent, JobId, JobStatusView, Stage, UsageStats,
    VideoStatus,
};

use crate::admission::{AdmissionError, InMemoryUsageGate, UsageGate, UsageOutcome};
use crate::clip_pipeline::process_clips;
use crate::config::WorkerConfig;
use crate::error::{panic_message, WorkerError, WorkerResult};
use crate::metrics;
use crate::planner::ScenePlanner;
use crate::processor::{ProcessingContext, Services};
use crate::progress::ProgressChannel;
use crate::registry::JobRegistry;
use crate::stitcher::stitch_clips;
use crate::store::{JobStore, JsonFileJobStore};

/// Handle to an admitted job.
pub struct JobTicket {
    pub job_id: JobId,
    /// Events from admission onwards, including the terminal status
    pub events: broadcast::Receiver<JobEvent>,
    handle: JoinHandle<VideoStatus>,
}

impl JobTicket {
    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> VideoStatus {
        self.handle.await.unwrap_or(VideoStatus::Failed)
    }
}

struct Inner {
    config: Arc<WorkerConfig>,
    services: Services,
    store: Arc<dyn JobStore>,
    usage: Arc<dyn UsageGate>,
    registry: JobRegistry,
    render_slots: Arc<Semaphore>,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
}

/// Accepts generation requests and drives them to completion.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(
        config: WorkerConfig,
        services: Services,
        store: Arc<dyn JobStore>,
        usage: Arc<dyn UsageGate>,
    ) -> Self {
        let render_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                services,
                store,
                usage,
                registry: JobRegistry::new(),
                render_slots,
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Production wiring: external services from the environment, JSON job
    /// records under `jobs_dir`, in-memory usage limits.
    pub async fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        let services = Services::from_env()?;
        let store = JsonFileJobStore::open(&config.jobs_dir).await?;
        info!(dir = %store.dir().display(), "Job records stored on disk");
        let usage = InMemoryUsageGate::new(config.daily_limit, config.max_generating_per_user);
        Ok(Self::new(config, services, Arc::new(store), Arc::new(usage)))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Admit a request and start it in the background.
    ///
    /// On success the job is already GENERATING in the store and registry.
    pub async fn submit(&self, request: GenerationRequest) -> Result<JobTicket, AdmissionError> {
        let result = self.admit(request).await;
        if let Err(e) = &result {
            info!(reason = e.reason(), "Submission rejected: {}", e);
            metrics::record_job_rejected(e.reason());
        }
        result
    }

    async fn admit(&self, request: GenerationRequest) -> Result<JobTicket, AdmissionError> {
        let inner = &self.inner;
        if !inner.accepting.load(Ordering::SeqCst) {
            return Err(AdmissionError::ShuttingDown);
        }
        request.validate()?;

        let mut job = GenerationJob::new(&request);
        let job_id = job.id.clone();

        inner
            .registry
            .claim(&request.concept_id, &job_id)
            .await
            .map_err(|holder| AdmissionError::AlreadyGenerating {
                concept_id: request.concept_id.clone(),
                job_id: holder,
            })?;

        if let Err(e) = inner.usage.try_admit(&request.user_id).await {
            inner.registry.release(&request.concept_id, &job_id).await;
            return Err(e);
        }

        if let Err(e) = job.start() {
            self.withdraw(&request, &job_id).await;
            return Err(e.into());
        }

        let channel = Arc::new(ProgressChannel::new(job, inner.config.event_buffer));
        channel.log(format!(
            "Video generation started for \"{}\"",
            request.concept_name
        ));

        if let Err(e) = inner.store.save(&channel.snapshot()).await {
            self.withdraw(&request, &job_id).await;
            return Err(AdmissionError::Store(e.to_string()));
        }

        inner.registry.insert(channel.clone()).await;
        let events = channel.subscribe();
        let running = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_jobs_in_flight(running);

        info!(
            job_id = %job_id,
            user_id = %request.user_id,
            concept_id = %request.concept_id,
            "Job admitted"
        );

        let handle = tokio::spawn(run_job(Arc::clone(inner), channel));
        Ok(JobTicket {
            job_id,
            events,
            handle,
        })
    }

    async fn withdraw(&self, request: &GenerationRequest, job_id: &JobId) {
        self.inner
            .usage
            .release(&request.user_id, UsageOutcome::Withdrawn)
            .await;
        self.inner
            .registry
            .release(&request.concept_id, job_id)
            .await;
    }

    /// Status of a job, live if it is in memory, otherwise from the store.
    pub async fn status(&self, job_id: &JobId) -> WorkerResult<Option<JobStatusView>> {
        if let Some(channel) = self.inner.registry.get(job_id).await {
            return Ok(Some(channel.snapshot().status_view()));
        }
        Ok(self
            .inner
            .store
            .load(job_id)
            .await?
            .map(|job| job.status_view()))
    }

    /// Status of the most recent job for a concept, or NOT_STARTED.
    pub async fn status_for_concept(&self, concept_id: &str) -> WorkerResult<JobStatusView> {
        if let Some(channel) = self.inner.registry.latest_for_concept(concept_id).await {
            return Ok(channel.snapshot().status_view());
        }
        Ok(self
            .inner
            .store
            .latest_for_concept(concept_id)
            .await?
            .map(|job| job.status_view())
            .unwrap_or_else(|| JobStatusView::not_started(concept_id)))
    }

    /// Follow a live job's events.
    pub async fn subscribe(&self, job_id: &JobId) -> Option<broadcast::Receiver<JobEvent>> {
        self.inner
            .registry
            .get(job_id)
            .await
            .map(|channel| channel.subscribe())
    }

    pub async fn usage(&self, user_id: &str) -> UsageStats {
        self.inner.usage.usage(user_id).await
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn available_render_slots(&self) -> usize {
        self.inner.render_slots.available_permits()
    }

    /// Stop accepting work and wait for in-flight jobs.
    ///
    /// Returns `false` if jobs were still running when the timeout expired.
    pub async fn shutdown(&self) -> bool {
        self.inner.accepting.store(false, Ordering::SeqCst);
        info!(in_flight = self.in_flight(), "Waiting for in-flight jobs to complete...");

        let drained = tokio::time::timeout(self.inner.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_ok();
        if drained {
            let evicted = self.inner.registry.evict_finished().await;
            let live_jobs = self.inner.registry.len().await;
            info!(evicted, live_jobs, "Orchestrator stopped");
        } else {
            warn!(in_flight = self.in_flight(), "Shutdown timed out with jobs still running");
        }
        drained
    }

    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn run_job(inner: Arc<Inner>, channel: Arc<ProgressChannel>) -> VideoStatus {
    let started = Instant::now();
    let ctx = ProcessingContext::new(inner.config.clone(), inner.services.clone(), channel)
        .with_store(inner.store.clone());
    let span = ctx.logger.create_span();

    let outcome = AssertUnwindSafe(execute(&inner, &ctx))
        .catch_unwind()
        .instrument(span)
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(WorkerError::job_failed(format!(
            "Pipeline panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    let status = finish(&inner, &ctx, result).await;
    metrics::record_job_finished(status.as_str(), started.elapsed().as_secs_f64());

    if !inner.config.keep_work_files {
        if let Err(e) = tokio::fs::remove_dir_all(&ctx.job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %ctx.job_dir.display(), error = %e, "Failed to clean job directory");
            }
        }
    }

    let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    metrics::set_jobs_in_flight(remaining);
    status
}

/// The pipeline proper: permit, plan, clips, stitch.
async fn execute(inner: &Inner, ctx: &ProcessingContext) -> WorkerResult<PathBuf> {
    let config = &inner.config;
    let channel = &ctx.channel;

    if inner.render_slots.available_permits() == 0 {
        ctx.logger.log_progress("Waiting for a free render slot");
    }
    let _permit = inner
        .render_slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| WorkerError::job_failed("Render slots closed"))?;

    let job = channel.snapshot();
    tokio::fs::create_dir_all(&ctx.job_dir).await?;

    channel.progress(0, 1, Stage::Splitting, "Splitting concept into scenes");
    let plan = ScenePlanner::new(ctx.services.generator.clone(), config.scene_temperature)
        .plan(&job.concept_name, &job.concept_description)
        .await;
    if plan.used_fallback {
        ctx.logger.log_warning(&format!(
            "Scene plan unavailable, split the description into {} scene(s)",
            plan.len()
        ));
    } else {
        ctx.logger
            .log_progress(&format!("Planned {} scenes", plan.len()));
    }
    channel.progress(1, 1, Stage::Splitting, format!("{} scenes planned", plan.len()));

    let tasks = plan.into_tasks();
    channel.update(|job| job.set_plan(tasks.clone()));
    ctx.persist().await;

    let clips = process_clips(ctx, tasks).await;
    channel.update(|job| job.set_plan(clips.clone()));

    let total = clips.len();
    let succeeded = clips.iter().filter(|c| c.is_usable()).count();
    if succeeded == 0 {
        return Err(WorkerError::NoUsableClips { total });
    }
    if (succeeded as f64) < config.min_success_ratio * total as f64 {
        return Err(WorkerError::InsufficientClips {
            succeeded,
            total,
            required: config.min_success_ratio * 100.0,
        });
    }
    if succeeded < total {
        ctx.logger.log_warning(&format!(
            "{} of {} scenes failed, stitching the rest",
            total - succeeded,
            total
        ));
    }

    channel.progress(0, 1, Stage::Stitching, format!("Stitching {} clips", succeeded));
    let final_path = config.videos_dir.join(final_video_name(&job.concept_id));
    let output = stitch_clips(
        ctx.services.muxer.as_ref(),
        &clips,
        &ctx.job_dir,
        &final_path,
        config.fade_secs,
    )
    .await?;
    channel.progress(1, 1, Stage::Stitching, "Final video ready");

    Ok(output.path)
}

/// Record the terminal state, persist it, and give back every claim.
///
/// A job whose terminal record reached the store is dropped from memory;
/// later queries are served from the store.
async fn finish(inner: &Inner, ctx: &ProcessingContext, result: WorkerResult<PathBuf>) -> VideoStatus {
    let channel = &ctx.channel;

    match result {
        Ok(path) => match channel.update(|job| job.complete(path.clone())) {
            Ok(()) => ctx
                .logger
                .log_completion(&format!("Video ready: {}", path.display())),
            Err(e) => fail_job(ctx, &e.to_string()),
        },
        Err(e) => fail_job(ctx, &e.to_string()),
    }

    let snapshot = channel.snapshot();
    let persisted = ctx.persist().await;
    channel.publish_status();

    if persisted {
        inner.registry.remove(&snapshot.id).await;
        let live_jobs = inner.registry.len().await;
        debug!(
            job_id = %snapshot.id,
            live_jobs,
            subscribers = channel.subscriber_count(),
            "Finished job evicted from memory"
        );
    }
    inner
        .registry
        .release(&snapshot.concept_id, &snapshot.id)
        .await;
    inner
        .usage
        .release(&snapshot.user_id, UsageOutcome::from(snapshot.status))
        .await;

    snapshot.status
}

fn fail_job(ctx: &ProcessingContext, message: &str) {
    ctx.logger
        .log_error(&format!("Video generation failed: {}", message));
    if let Err(e) = ctx.channel.update(|job| job.fail(message)) {
        error!(job_id = %ctx.channel.job_id(), error = %e, "Could not mark job failed");
    }
}

/// `{concept_id}_final.mp4`, with path-unsafe characters replaced.
fn final_video_name(concept_id: &str) -> String {
    let safe: String = concept_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_final.mp4", safe)
}
