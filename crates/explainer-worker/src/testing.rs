//! In-process fakes of the external services.
//!
//! Scene behavior is driven by markers in the scene description:
//! `FAIL` never renders, `FLAKY` fails its first render only, `SLOW` delays
//! the render, `PANIC` panics inside the renderer. Generated code carries the
//! markers forward so corrections keep the same behavior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use explainer_genai::{GenAiError, GenAiResult, TextGenerator};
use explainer_media::{
    MediaError, MediaMuxer, MediaResult, ReconcilePlan, SceneRenderer, SpeechSynthesizer,
};

use crate::processor::Services;

const MARKERS: [&str; 4] = ["FAIL", "FLAKY", "SLOW", "PANIC"];

fn markers_in(text: &str) -> Vec<&'static str> {
    MARKERS.iter().copied().filter(|m| text.contains(m)).collect()
}

/// Scripted text generator.
#[derive(Default)]
pub struct FakeGenerator {
    /// Scene list returned for the split prompt; `None` answers with prose.
    pub scenes: Option<Vec<String>>,
    /// Caption list; `None` echoes the scene descriptions.
    pub captions: Option<Vec<String>>,
    pub fail_split: bool,
    pub fail_narration: bool,
    pub fail_code: bool,
    pub panic_on_split: bool,
    pub prompts: Mutex<Vec<String>>,
    pub split_calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn with_scenes(scenes: &[&str]) -> Self {
        Self {
            scenes: Some(scenes.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str, _temperature: f32) -> GenAiResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.contains("Break the concept into") {
            self.split_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_split {
                panic!("planner exploded");
            }
            if self.fail_split {
                return Err(GenAiError::api(503, "model overloaded"));
            }
            return Ok(match &self.scenes {
                Some(scenes) => serde_json::to_string(scenes).unwrap(),
                None => "Sorry, I cannot help with that.".to_string(),
            });
        }

        if prompt.contains("Write a one-sentence caption") {
            return match &self.captions {
                Some(captions) => Ok(serde_json::to_string(captions).unwrap()),
                None => Err(GenAiError::EmptyResponse),
            };
        }

        if prompt.contains("Write the voice-over") {
            if self.fail_narration {
                return Err(GenAiError::api(500, "internal"));
            }
            return Ok("\"Here is what happens in this scene.\"".to_string());
        }

        if self.fail_code {
            return Err(GenAiError::api(503, "unavailable"));
        }
        Ok(format!(
            "```python\nfrom manim import *\n# markers: {}\nclass GeneratedScene(Scene):\n    def construct(self):\n        pass\n```",
            markers_in(prompt).join(" ")
        ))
    }
}

/// Renderer that writes a small file per render.
#[derive(Default)]
pub struct FakeRenderer {
    /// When set, every render waits for a permit (added by the test).
    pub gate: Option<Arc<Semaphore>>,
    pub calls: Mutex<HashMap<String, usize>>,
    pub started: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeRenderer {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, output_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(output_name)
            .copied()
            .unwrap_or(0)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SceneRenderer for FakeRenderer {
    async fn render(&self, source: &str, output_dir: &Path, output_name: &str) -> MediaResult<PathBuf> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(output_name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.unwrap();
            permit.forget();
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if source.contains("SLOW") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        } else {
            tokio::task::yield_now().await;
        }
        if source.contains("PANIC") {
            panic!("renderer exploded");
        }
        if source.contains("FAIL") || (source.contains("FLAKY") && attempt == 1) {
            return Err(MediaError::render_failed(
                "Manim exited with status 1",
                "NameError: name 'Circl' is not defined",
            ));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(output_name);
        tokio::fs::write(&path, format!("video:{}", output_name)).await?;
        Ok(path)
    }
}

/// Speech synthesizer writing the text to the output file.
#[derive(Default)]
pub struct FakeSpeech {
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, output_path: &Path) -> MediaResult<()> {
        if self.fail {
            return Err(MediaError::speech_failed("voice service unreachable"));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, text).await?;
        Ok(())
    }
}

/// Muxer that records calls and writes traceable files.
///
/// `concat` writes the input paths one per line, so the stitched output
/// shows exactly which clips went in and in what order.
#[derive(Default)]
pub struct FakeMuxer {
    pub duration: Option<f64>,
    pub fail_merge: bool,
    pub fail_fade: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeMuxer {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }

    pub fn called(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    fn record(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }
}

#[async_trait]
impl MediaMuxer for FakeMuxer {
    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        self.record("probe");
        self.duration
            .ok_or_else(|| MediaError::invalid_media("no duration"))
    }

    async fn merge(
        &self,
        video: &Path,
        _audio: &Path,
        plan: &ReconcilePlan,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        self.record("merge");
        if self.fail_merge {
            return Err(MediaError::ffmpeg_failed("merge failed", None, Some(1)));
        }
        tokio::fs::write(output, format!("merged:{}:{}", video.display(), plan.as_str())).await?;
        Ok(output.to_path_buf())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        self.record("concat");
        let listing = inputs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        tokio::fs::write(output, listing).await?;
        Ok(output.to_path_buf())
    }

    async fn fade_out(&self, input: &Path, _start: f64, _duration: f64, output: &Path) -> MediaResult<PathBuf> {
        self.record("fade");
        if self.fail_fade {
            return Err(MediaError::ffmpeg_failed("fade failed", None, Some(1)));
        }
        tokio::fs::copy(input, output).await?;
        Ok(output.to_path_buf())
    }
}

/// Fakes bundled as services, with handles kept for assertions.
pub struct FakeServices {
    pub generator: Arc<FakeGenerator>,
    pub renderer: Arc<FakeRenderer>,
    pub speech: Arc<FakeSpeech>,
    pub muxer: Arc<FakeMuxer>,
}

impl FakeServices {
    pub fn new(generator: FakeGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            renderer: Arc::new(FakeRenderer::default()),
            speech: Arc::new(FakeSpeech::default()),
            muxer: Arc::new(FakeMuxer::with_duration(5.0)),
        }
    }

    pub fn with_renderer(mut self, renderer: FakeRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_speech(mut self, speech: FakeSpeech) -> Self {
        self.speech = Arc::new(speech);
        self
    }

    pub fn with_muxer(mut self, muxer: FakeMuxer) -> Self {
        self.muxer = Arc::new(muxer);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            generator: self.generator.clone(),
            renderer: self.renderer.clone(),
            speech: self.speech.clone(),
            muxer: self.muxer.clone(),
        }
    }
}
