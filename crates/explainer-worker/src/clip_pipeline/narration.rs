//! Narration: a spoken script per scene, synthesized to an audio track.

use std::path::PathBuf;

use explainer_genai::{clean_prose, prompts};
use explainer_models::ClipTask;

use crate::processor::ProcessingContext;

/// Script for a scene, falling back to the scene description.
pub async fn narration_script(ctx: &ProcessingContext, task: &ClipTask) -> String {
    let prompt = prompts::narration(&task.scene_description);
    match ctx
        .services
        .generator
        .generate(&prompt, ctx.config.narration_temperature)
        .await
    {
        Ok(response) => {
            let script = clean_prose(&response);
            if script.is_empty() {
                task.scene_description.clone()
            } else {
                script
            }
        }
        Err(e) => {
            ctx.logger.log_warning(&format!(
                "Scene {}: narration script unavailable, reading scene description ({})",
                task.index + 1,
                e
            ));
            task.scene_description.clone()
        }
    }
}

/// Produce the narration track for a clip.
///
/// Returns `None` when synthesis fails; the clip then goes on silent.
pub async fn prepare_narration(ctx: &ProcessingContext, task: &ClipTask) -> Option<PathBuf> {
    let script = narration_script(ctx, task).await;
    let output = ctx.clips_dir().join(task.narration_filename());

    match ctx.services.speech.synthesize(&script, &output).await {
        Ok(()) => Some(output),
        Err(e) => {
            ctx.logger.log_warning(&format!(
                "Scene {}: narration synthesis failed, clip will be silent ({})",
                task.index + 1,
                e
            ));
            None
        }
    }
}
