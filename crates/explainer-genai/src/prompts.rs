//! Prompt templates for scene planning, narration and scene code.

/// Ask for the concept broken into an ordered JSON array of scene descriptions.
pub fn split_scenes(concept_name: &str, concept_description: &str) -> String {
    format!(
        "You are planning a short animated explainer video.\n\
         Concept: {concept_name}\n\
         Description: {concept_description}\n\n\
         Break the concept into 3 to 6 scenes that build on each other. \
         Each scene must be a self-contained visual description a Manim \
         animator could implement in under 20 seconds of animation.\n\
         Respond with a JSON array of strings only, one string per scene, in order."
    )
}

/// Ask for one short viewer-facing caption per scene.
pub fn captions(concept_name: &str, scenes: &[String]) -> String {
    let numbered = scenes
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Write a one-sentence caption for each scene of an explainer video about \"{concept_name}\".\n\
         Scenes:\n{numbered}\n\n\
         Respond with a JSON array of exactly {count} strings, in the same order.",
        count = scenes.len()
    )
}

/// Ask for a spoken narration script for one scene.
pub fn narration(scene_description: &str) -> String {
    format!(
        "Write the voice-over for this scene of an educational animation:\n\
         {scene_description}\n\n\
         Use two or three plain spoken sentences. Do not describe camera moves or \
         include stage directions. Respond with the narration text only."
    )
}

/// Ask for initial Manim code for a scene.
pub fn generate_code(scene_description: &str) -> String {
    format!(
        "Write a complete Manim Community Edition script for this scene:\n\
         {scene_description}\n\n\
         Requirements:\n\
         - Start with `from manim import *`\n\
         - Define exactly one class deriving from Scene with a construct method\n\
         - Use only built-in Manim objects; no external files, images or LaTeX packages\n\
         - Keep the animation under 20 seconds\n\
         Respond with the code in a single ```python block."
    )
}

/// Ask for a fix of code that failed to render.
pub fn correct_code(code: &str, error: &str) -> String {
    format!(
        "The following Manim script failed to render.\n\n\
         ```python\n{code}\n```\n\n\
         Renderer output:\n{error}\n\n\
         Fix the script so it renders. Keep the same scene class and intent. \
         Respond with the full corrected code in a single ```python block."
    )
}
