//! Cleanup of model output: code extraction and prose normalization.

const MANIM_IMPORT: &str = "from manim import *";

/// Pull renderable scene source out of a model response.
///
/// Prefers a ```python fenced block, then any fenced block, then the whole
/// response, and makes sure the manim import is present.
pub fn extract_scene_source(response: &str) -> String {
    let code = fenced_block(response, "```python")
        .or_else(|| fenced_block(response, "```"))
        .unwrap_or(response)
        .trim();

    if code.lines().any(|l| l.trim() == MANIM_IMPORT) {
        code.to_string()
    } else {
        format!("{}\n\n{}", MANIM_IMPORT, code)
    }
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    // Skip the rest of the opener line (e.g. a language tag).
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let body = &rest[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

/// Normalize a prose response (narration, captions) to plain text.
pub fn clean_prose(response: &str) -> String {
    let text = fenced_block(response, "```").unwrap_or(response).trim();
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
