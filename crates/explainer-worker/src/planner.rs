//! Scene planning: concept description to ordered scenes and captions.
//!
//! Planning never fails a job. A response that does not parse as a JSON list
//! of strings falls back to sentence splitting of the description, and a
//! caption list of the wrong length falls back to the scene texts.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use explainer_genai::{clean_prose, prompts, TextGenerator};
use explainer_models::ClipTask;

/// Sentences this short are treated as fragments and dropped.
const MIN_SENTENCE_CHARS: usize = 10;

/// Planned scenes and their captions, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePlan {
    pub scenes: Vec<String>,
    pub captions: Vec<String>,
    /// The scene list came from sentence splitting, not the model
    pub used_fallback: bool,
}

impl ScenePlan {
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// One pending clip task per scene, indexed in plan order.
    pub fn into_tasks(self) -> Vec<ClipTask> {
        self.scenes
            .into_iter()
            .zip(self.captions)
            .enumerate()
            .map(|(index, (scene, caption))| ClipTask::new(index, scene, caption))
            .collect()
    }
}

/// Turns a concept into scenes using a text generator.
pub struct ScenePlanner {
    generator: Arc<dyn TextGenerator>,
    temperature: f32,
}

impl ScenePlanner {
    pub fn new(generator: Arc<dyn TextGenerator>, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    /// Plan the scenes for a concept. Always returns at least one scene.
    pub async fn plan(&self, concept_name: &str, concept_description: &str) -> ScenePlan {
        let (scenes, used_fallback) = match self.split(concept_name, concept_description).await {
            Some(scenes) => (scenes, false),
            None => (fallback_scenes(concept_description, concept_name), true),
        };
        let captions = self.captions(concept_name, &scenes).await;

        ScenePlan {
            scenes,
            captions,
            used_fallback,
        }
    }

    async fn split(&self, concept_name: &str, concept_description: &str) -> Option<Vec<String>> {
        let prompt = prompts::split_scenes(concept_name, concept_description);
        match self.generator.generate(&prompt, self.temperature).await {
            Ok(response) => {
                let scenes = parse_string_list(&response);
                if scenes.is_none() {
                    warn!(concept = concept_name, "Scene list did not parse; splitting description");
                }
                scenes
            }
            Err(e) => {
                warn!(concept = concept_name, error = %e, "Scene split failed; splitting description");
                None
            }
        }
    }

    async fn captions(&self, concept_name: &str, scenes: &[String]) -> Vec<String> {
        let prompt = prompts::captions(concept_name, scenes);
        let parsed = match self.generator.generate(&prompt, self.temperature).await {
            Ok(response) => parse_string_list(&response),
            Err(e) => {
                debug!(error = %e, "Caption generation failed");
                None
            }
        };

        match parsed {
            Some(captions) if captions.len() == scenes.len() => captions,
            Some(captions) => {
                debug!(
                    expected = scenes.len(),
                    got = captions.len(),
                    "Caption count mismatch; using scene texts"
                );
                scenes.to_vec()
            }
            None => scenes.to_vec(),
        }
    }
}

static LIST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid list regex"));

/// Extract the outermost JSON array of strings from a model response.
///
/// Returns `None` for anything unparseable or for a list with no non-blank entries.
pub fn parse_string_list(response: &str) -> Option<Vec<String>> {
    let candidate = LIST_PATTERN.find(response)?.as_str();
    let items: Vec<String> = serde_json::from_str(candidate).ok()?;
    let items: Vec<String> = items
        .iter()
        .map(|s| clean_prose(s))
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Sentences of the description longer than the fragment threshold, or the
/// whole description (or, if that is blank, the concept name) as one scene.
pub fn fallback_scenes(description: &str, concept_name: &str) -> Vec<String> {
    let sentences: Vec<String> = description
        .split('.')
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .map(str::to_string)
        .collect();

    if !sentences.is_empty() {
        return sentences;
    }
    let whole = description.trim();
    if whole.is_empty() {
        vec![concept_name.trim().to_string()]
    } else {
        vec![whole.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGenerator;

    #[test]
    fn test_parse_string_list() {
        assert_eq!(
            parse_string_list("Sure!\n```json\n[\"Draw a circle\", \"Grow it\"]\n```"),
            Some(vec!["Draw a circle".to_string(), "Grow it".to_string()])
        );
        assert_eq!(parse_string_list("no list here"), None);
        assert_eq!(parse_string_list("[1, 2, 3]"), None);
        assert_eq!(parse_string_list("[]"), None);
        assert_eq!(parse_string_list("[\"  \"]"), None);
    }

    #[test]
    fn test_fallback_scenes_splits_sentences() {
        let scenes = fallback_scenes(
            "Heat flows from hot to cold. Ok. Entropy of an isolated system never decreases.",
            "Entropy",
        );
        assert_eq!(
            scenes,
            vec![
                "Heat flows from hot to cold".to_string(),
                "Entropy of an isolated system never decreases".to_string(),
            ]
        );
    }

    #[test]
    fn test_fallback_scenes_uses_whole_description() {
        assert_eq!(fallback_scenes("Short. Tiny.", "X"), vec!["Short. Tiny.".to_string()]);
        assert_eq!(fallback_scenes("   ", "Entropy"), vec!["Entropy".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_uses_model_scenes_and_captions() {
        let generator = FakeGenerator {
            captions: Some(vec!["One".into(), "Two".into()]),
            ..FakeGenerator::with_scenes(&["Scene one", "Scene two"])
        };
        let planner = ScenePlanner::new(Arc::new(generator), 0.3);

        let plan = planner.plan("Entropy", "Disorder grows over time.").await;
        assert!(!plan.used_fallback);
        assert_eq!(plan.scenes, vec!["Scene one", "Scene two"]);
        assert_eq!(plan.captions, vec!["One", "Two"]);

        let tasks = plan.into_tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].index, 1);
        assert_eq!(tasks[1].caption, "Two");
    }

    #[tokio::test]
    async fn test_unparseable_plan_falls_back_to_sentences() {
        let planner = ScenePlanner::new(Arc::new(FakeGenerator::default()), 0.3);
        let plan = planner
            .plan("Entropy", "Heat flows from hot to cold. Disorder tends to increase.")
            .await;

        assert!(plan.used_fallback);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.captions, plan.scenes);
    }

    #[tokio::test]
    async fn test_generator_failure_still_yields_a_scene() {
        let generator = FakeGenerator {
            fail_split: true,
            ..FakeGenerator::default()
        };
        let planner = ScenePlanner::new(Arc::new(generator), 0.3);
        let plan = planner.plan("Entropy", "Disorder.").await;

        assert!(plan.used_fallback);
        assert_eq!(plan.scenes, vec!["Disorder."]);
        assert!(!plan.is_empty());
    }

    #[tokio::test]
    async fn test_caption_count_mismatch_uses_scene_texts() {
        let generator = FakeGenerator {
            captions: Some(vec!["Only one".into()]),
            ..FakeGenerator::with_scenes(&["Scene one", "Scene two"])
        };
        let planner = ScenePlanner::new(Arc::new(generator), 0.3);
        let plan = planner.plan("Entropy", "Disorder grows.").await;

        assert_eq!(plan.captions, vec!["Scene one", "Scene two"]);
    }
}
