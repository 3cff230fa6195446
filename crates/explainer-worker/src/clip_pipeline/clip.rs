//! Single clip processing: narration, render with correction, and the
//! audio/video merge.

use explainer_media::reconcile_clip;
use explainer_models::{ClipState, ClipTask};
use tracing::debug;

use crate::clip_pipeline::narration::prepare_narration;
use crate::clip_pipeline::render::render_with_correction;
use crate::metrics;
use crate::processor::ProcessingContext;

/// Drive one clip to a terminal state.
///
/// Narration and merge problems degrade the clip (silent, or unmerged) but
/// never fail it; only exhausting the render attempts does.
pub async fn process_single_clip(ctx: &ProcessingContext, mut task: ClipTask, total: usize) -> ClipTask {
    let scene_no = task.index + 1;

    task.narration_path = prepare_narration(ctx, &task).await;

    let Some(video) = render_with_correction(ctx, &mut task, total).await else {
        let reason = task
            .last_error
            .clone()
            .unwrap_or_else(|| "render attempts exhausted".to_string());
        task.mark_failed(reason);
        ctx.logger.log_warning(&format!(
            "Scene {} failed after {} attempt(s)",
            scene_no, task.attempts
        ));
        metrics::record_clip(ClipState::Failed.as_str(), task.attempts);
        return task;
    };

    task.mark_rendered(video.clone());

    if let Some(audio) = task.narration_path.clone() {
        let merged = ctx.clips_dir().join(task.merged_filename());
        match reconcile_clip(ctx.services.muxer.as_ref(), &video, &audio, &merged).await {
            Ok(outcome) => {
                debug!(scene = scene_no, plan = outcome.plan.as_str(), "Narration merged");
                task.replace_media(outcome.path);
            }
            Err(e) => {
                ctx.logger.log_warning(&format!(
                    "Scene {}: narration merge failed, using silent render ({})",
                    scene_no, e
                ));
            }
        }
    }

    ctx.logger.log_progress(&format!(
        "Scene {}/{} rendered after {} attempt(s)",
        scene_no, total, task.attempts
    ));
    metrics::record_clip(ClipState::Succeeded.as_str(), task.attempts);
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use explainer_models::{GenerationJob, GenerationRequest};

    use crate::config::WorkerConfig;
    use crate::progress::ProgressChannel;
    use crate::testing::{FakeGenerator, FakeMuxer, FakeServices, FakeSpeech};

    fn context(fakes: &FakeServices, work_dir: &std::path::Path) -> ProcessingContext {
        let config = WorkerConfig {
            work_dir: work_dir.to_path_buf(),
            ..WorkerConfig::default()
        };
        let request = GenerationRequest::new("u", "c", "Entropy", "Disorder grows.");
        let channel = Arc::new(ProgressChannel::new(GenerationJob::new(&request), 64));
        ProcessingContext::new(Arc::new(config), fakes.services(), channel)
    }

    #[tokio::test]
    async fn test_clip_renders_first_try_with_narration() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(0, "Draw a circle", "Circle"), 1).await;

        assert_eq!(task.state, ClipState::Succeeded);
        assert_eq!(task.attempts, 1);
        assert!(task.narration_path.is_some());
        assert_eq!(
            task.media_path.as_ref().unwrap().file_name().unwrap(),
            "clip_0_final.mp4"
        );
        assert_eq!(fakes.muxer.called("merge"), 1);
    }

    #[tokio::test]
    async fn test_flaky_render_is_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(2, "FLAKY axes", "Axes"), 3).await;

        assert_eq!(task.state, ClipState::Succeeded);
        assert_eq!(task.attempts, 2);
        assert_eq!(fakes.renderer.calls_for("clip_2.mp4"), 2);
        assert_eq!(fakes.generator.prompts_containing("failed to render"), 1);
        assert_eq!(
            fakes.generator.prompts_containing("NameError: name 'Circl' is not defined"),
            1
        );
    }

    #[tokio::test]
    async fn test_never_more_than_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default());
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(1, "FAIL always", "Broken"), 2).await;

        assert_eq!(task.state, ClipState::Failed);
        assert_eq!(task.attempts, 3);
        assert!(!task.rendered);
        assert!(task.media_path.is_none());
        assert_eq!(fakes.renderer.calls_for("clip_1.mp4"), 3);
        assert_eq!(fakes.generator.prompts_containing("failed to render"), 2);
        assert!(task.last_error.unwrap().contains("NameError"));
    }

    #[tokio::test]
    async fn test_code_generation_failure_consumes_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator {
            fail_code: true,
            ..FakeGenerator::default()
        };
        let fakes = FakeServices::new(generator);
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(0, "Draw a circle", "Circle"), 1).await;

        assert_eq!(task.state, ClipState::Failed);
        assert_eq!(task.attempts, 3);
        assert_eq!(fakes.renderer.calls_for("clip_0.mp4"), 0);
        assert!(task.last_error.unwrap().starts_with("Code generation failed"));
    }

    #[tokio::test]
    async fn test_speech_failure_leaves_silent_clip() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = FakeServices::new(FakeGenerator::default()).with_speech(FakeSpeech { fail: true });
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(0, "Draw a circle", "Circle"), 1).await;

        assert_eq!(task.state, ClipState::Succeeded);
        assert!(task.narration_path.is_none());
        assert_eq!(fakes.muxer.called("merge"), 0);
        assert_eq!(task.media_path.unwrap().file_name().unwrap(), "clip_0.mp4");
    }

    #[tokio::test]
    async fn test_narration_script_failure_reads_description() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator {
            fail_narration: true,
            ..FakeGenerator::default()
        };
        let fakes = FakeServices::new(generator);
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(0, "Draw a circle", "Circle"), 1).await;

        let spoken = tokio::fs::read_to_string(task.narration_path.unwrap()).await.unwrap();
        assert_eq!(spoken, "Draw a circle");
    }

    #[tokio::test]
    async fn test_merge_failure_keeps_unmerged_render() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = FakeMuxer {
            fail_merge: true,
            ..FakeMuxer::with_duration(4.0)
        };
        let fakes = FakeServices::new(FakeGenerator::default()).with_muxer(muxer);
        let ctx = context(&fakes, dir.path());

        let task = process_single_clip(&ctx, ClipTask::new(0, "Draw a circle", "Circle"), 1).await;

        assert_eq!(task.state, ClipState::Succeeded);
        assert_eq!(task.media_path.unwrap().file_name().unwrap(), "clip_0.mp4");
    }
}
