//! Render loop: generate code, render, and feed failures back for correction.

use std::path::PathBuf;

use explainer_genai::{extract_scene_source, prompts};
use explainer_models::{ClipTask, Stage};

use crate::processor::ProcessingContext;

/// The most recent failed render, input to the next correction.
struct FailedRender {
    source: String,
    feedback: String,
}

/// Run up to `max_render_attempts` generate/render cycles for a clip.
///
/// Every cycle consumes one attempt whether it fails at code generation or
/// at render time. Returns the rendered artifact, or `None` once attempts are
/// exhausted with `task.last_error` holding the final failure.
pub async fn render_with_correction(
    ctx: &ProcessingContext,
    task: &mut ClipTask,
    total: usize,
) -> Option<PathBuf> {
    let scene_no = task.index + 1;
    let max = ctx.config.max_render_attempts;
    let output_dir = ctx.clips_dir().join(format!("render_{}", task.index));
    let output_name = task.render_filename();
    let mut previous: Option<FailedRender> = None;

    while let Ok(attempt) = task.begin_attempt(max) {
        ctx.channel.progress(
            ctx.clips_done(),
            total,
            Stage::GeneratingCode,
            format!("Scene {}: generating code (attempt {}/{})", scene_no, attempt, max),
        );

        let prompt = match &previous {
            Some(failed) => prompts::correct_code(&failed.source, &failed.feedback),
            None => prompts::generate_code(&task.scene_description),
        };
        let source = match ctx
            .services
            .generator
            .generate(&prompt, ctx.config.code_temperature)
            .await
        {
            Ok(response) => extract_scene_source(&response),
            Err(e) => {
                let message = format!("Code generation failed: {}", e);
                ctx.logger.log_warning(&format!(
                    "Scene {} attempt {}/{}: {}",
                    scene_no, attempt, max, message
                ));
                task.record_error(message);
                continue;
            }
        };

        ctx.channel.progress(
            ctx.clips_done(),
            total,
            Stage::Rendering,
            format!("Scene {}: rendering (attempt {}/{})", scene_no, attempt, max),
        );

        match ctx
            .services
            .renderer
            .render(&source, &output_dir, &output_name)
            .await
        {
            Ok(path) => return Some(path),
            Err(e) => {
                let feedback = e.feedback_text();
                ctx.logger.log_warning(&format!(
                    "Scene {} attempt {}/{} failed to render: {}",
                    scene_no,
                    attempt,
                    max,
                    last_line(&feedback)
                ));
                task.record_error(feedback.clone());
                previous = Some(FailedRender { source, feedback });
            }
        }
    }

    None
}

/// Last non-blank line; for tracebacks this is the exception itself.
fn last_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
