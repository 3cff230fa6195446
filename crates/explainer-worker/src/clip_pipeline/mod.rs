//! Clip pipeline: per-scene narration, render and merge, run in batches.
//!
//! Clips within a batch run concurrently; batches run one after another.
//! A clip that panics is contained and recorded as failed without disturbing
//! its siblings.

use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;

use explainer_models::{ClipTask, Stage};

use crate::error::panic_message;
use crate::processor::ProcessingContext;

pub mod clip;
pub mod narration;
pub mod render;

pub use clip::process_single_clip;

/// Process every clip and return them in index order.
pub async fn process_clips(ctx: &ProcessingContext, tasks: Vec<ClipTask>) -> Vec<ClipTask> {
    let total = tasks.len();
    let batch_size = ctx.config.batch_size.max(1);
    let batch_count = total.div_ceil(batch_size);
    let mut finished = Vec::with_capacity(total);

    if let Err(e) = tokio::fs::create_dir_all(ctx.clips_dir()).await {
        ctx.logger
            .log_warning(&format!("Could not create clip directory: {}", e));
    }

    ctx.logger.log_progress(&format!(
        "Rendering {} scenes in {} batch(es) of up to {}",
        total, batch_count, batch_size
    ));

    for (batch_no, batch) in tasks.chunks(batch_size).enumerate() {
        let first = batch.first().map(|t| t.index + 1).unwrap_or(0);
        let last = batch.last().map(|t| t.index + 1).unwrap_or(0);
        ctx.logger.log_progress(&format!(
            "Batch {}/{}: scenes {}-{}",
            batch_no + 1,
            batch_count,
            first,
            last
        ));

        let futures = batch
            .iter()
            .cloned()
            .map(|task| run_isolated(ctx, task, total));
        finished.extend(join_all(futures).await);

        let succeeded = finished.iter().filter(|t| t.is_usable()).count();
        ctx.channel.progress(
            finished.len(),
            total,
            Stage::Rendering,
            format!("{} of {} scenes done, {} usable", finished.len(), total, succeeded),
        );
        ctx.persist().await;
    }

    finished.sort_by_key(|t| t.index);
    finished
}

async fn run_isolated(ctx: &ProcessingContext, task: ClipTask, total: usize) -> ClipTask {
    let fallback = task.clone();
    let done = match AssertUnwindSafe(process_single_clip(ctx, task, total))
        .catch_unwind()
        .await
    {
        Ok(done) => done,
        Err(payload) => {
            let message = format!("Clip pipeline panicked: {}", panic_message(payload.as_ref()));
            ctx.logger
                .log_error(&format!("Scene {}: {}", fallback.index + 1, message));
            let mut failed = fallback;
            failed.mark_failed(message);
            failed
        }
    };
    ctx.finish_clip(&done);
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use explainer_models::{ClipState, GenerationJob, GenerationRequest, JobEvent};

    use crate::config::WorkerConfig;
    use crate::progress::ProgressChannel;
    use crate::store::{InMemoryJobStore, JobStore};
    use crate::testing::{FakeGenerator, FakeRenderer, FakeServices};

    fn context(fakes: &FakeServices, work_dir: &std::path::Path, batch_size: usize) -> ProcessingContext {
        let config = WorkerConfig {
            work_dir: work_dir.to_path_buf(),
            batch_size,
            ..WorkerConfig::default()
        };
        let request = GenerationRequest::new("u", "c", "Entropy", "Disorder grows.");
        let channel = Arc::new(ProgressChannel::new(GenerationJob::new(&request), 256));
        ProcessingContext::new(Arc::new(config), fakes.services(), channel)
    }

    fn tasks(descriptions: &[&str]) -> Vec<ClipTask> {
        descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| ClipTask::new(i, *d, *d))
            .collect()
    }

    #[tokio::test]
    async fn test_results_keep_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path(), 3);

        let done = process_clips(&ctx, tasks(&["SLOW first", "second", "third", "fourth"])).await;

        let indices: Vec<usize> = done.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(done.iter().all(|t| t.state == ClipState::Succeeded));
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path(), 2);

        process_clips(&ctx, tasks(&["SLOW a", "SLOW b", "SLOW c", "SLOW d", "SLOW e"])).await;

        assert_eq!(fakes.renderer.started.load(Ordering::SeqCst), 5);
        assert!(fakes.renderer.max_active.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_clip_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path(), 3);

        let done = process_clips(&ctx, tasks(&["first", "PANIC second", "third"])).await;

        assert_eq!(done[0].state, ClipState::Succeeded);
        assert_eq!(done[1].state, ClipState::Failed);
        assert!(done[1].last_error.as_ref().unwrap().contains("renderer exploded"));
        assert_eq!(done[2].state, ClipState::Succeeded);
    }

    #[tokio::test]
    async fn test_finished_clips_are_visible_before_later_batches() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Semaphore::new(1));
        let fakes = FakeServices::new(FakeGenerator::default())
            .with_renderer(FakeRenderer::gated(gate.clone()));
        let ctx = Arc::new(context(&fakes, dir.path(), 1));
        let plan = tasks(&["first", "second"]);
        ctx.channel.update(|job| job.set_plan(plan.clone()));

        let running = tokio::spawn({
            let ctx = ctx.clone();
            async move { process_clips(&ctx, plan).await }
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while fakes.renderer.started.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let live = ctx.channel.snapshot().clips;
        assert_eq!(live[0].state, ClipState::Succeeded);
        assert_eq!(live[0].attempts, 1);
        assert_eq!(live[1].state, ClipState::Pending);
        assert_eq!(ctx.clips_done(), 1);

        gate.add_permits(10);
        running.await.unwrap();
        assert!(ctx.channel.snapshot().clips.iter().all(|c| c.state == ClipState::Succeeded));
        assert_eq!(ctx.clips_done(), 2);
    }

    #[tokio::test]
    async fn test_clip_progress_never_goes_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path(), 3);
        let mut events = ctx.channel.subscribe();

        process_clips(&ctx, tasks(&["FLAKY a", "SLOW b", "c", "FLAKY d"])).await;

        let mut currents = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let JobEvent::Progress(update) = event {
                currents.push(update.current);
            }
        }
        assert!(currents.len() > 4);
        assert!(currents.windows(2).all(|w| w[0] <= w[1]), "{currents:?}");
        assert_eq!(currents.last(), Some(&4));
    }

    #[tokio::test]
    async fn test_batches_persist_the_live_record() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let store = Arc::new(InMemoryJobStore::new());
        let ctx = context(&fakes, dir.path(), 1).with_store(store.clone());
        let plan = tasks(&["FAIL one", "two"]);
        ctx.channel.update(|job| job.set_plan(plan.clone()));

        process_clips(&ctx, plan).await;

        let stored = store.load(ctx.channel.job_id()).await.unwrap().unwrap();
        assert_eq!(stored.clips[0].state, ClipState::Failed);
        assert_eq!(stored.clips[0].attempts, 3);
        assert_eq!(stored.clips[1].state, ClipState::Succeeded);
    }

    #[tokio::test]
    async fn test_failed_clip_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path(), 1);

        let done = process_clips(&ctx, tasks(&["FAIL one", "two"])).await;

        assert_eq!(done[0].state, ClipState::Failed);
        assert_eq!(done[0].attempts, 3);
        assert_eq!(done[1].state, ClipState::Succeeded);
    }
}
