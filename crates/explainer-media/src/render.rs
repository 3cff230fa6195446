//! Scene rendering through an isolated Manim process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::process::run_process;

/// Directory Manim uses for intermediate segments; never a final artifact.
const PARTIAL_MOVIE_DIR: &str = "partial_movie_files";
const DEFAULT_SCENE_CLASS: &str = "Scene";

/// Renders scene source code into a media file.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Render `source` into `output_dir`, returning the path of `output_name`.
    ///
    /// On failure the error carries the engine output that explains it
    /// (see [`MediaError::feedback_text`]).
    async fn render(&self, source: &str, output_dir: &Path, output_name: &str) -> MediaResult<PathBuf>;
}

/// Manim invocation settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Python interpreter with manim installed
    pub python: String,
    /// Quality flag suffix (`l`, `m`, `h`, `k`)
    pub quality: String,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            quality: "l".to_string(),
            timeout_secs: 600,
        }
    }
}

impl RenderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            python: std::env::var("MANIM_PYTHON").unwrap_or(defaults.python),
            quality: std::env::var("MANIM_QUALITY").unwrap_or(defaults.quality),
            timeout_secs: std::env::var("RENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// [`SceneRenderer`] that shells out to `python -m manim`.
#[derive(Debug, Clone, Default)]
pub struct ManimRenderer {
    config: RenderConfig,
}

impl ManimRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, script: &Path, scene_class: &str, output_dir: &Path, output_name: &str) -> Vec<String> {
        vec![
            "-m".to_string(),
            "manim".to_string(),
            script.to_string_lossy().to_string(),
            scene_class.to_string(),
            "-o".to_string(),
            output_name.to_string(),
            "--media_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "-v".to_string(),
            "WARNING".to_string(),
            format!("-q{}", self.config.quality),
        ]
    }
}

#[async_trait]
impl SceneRenderer for ManimRenderer {
    async fn render(&self, source: &str, output_dir: &Path, output_name: &str) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;

        // Removed on drop, whichever way this function returns.
        let script = tempfile::Builder::new()
            .prefix("scene_")
            .suffix(".py")
            .tempfile_in(output_dir)?;
        tokio::fs::write(script.path(), source).await?;

        let scene_class = detect_scene_class(source);
        let args = self.build_args(script.path(), &scene_class, output_dir, output_name);
        debug!(scene_class = %scene_class, output = output_name, "Invoking manim");

        let output = run_process(
            &self.config.python,
            &args,
            Some(Duration::from_secs(self.config.timeout_secs)),
        )
        .await?;

        if !output.success() {
            warn!(
                output = output_name,
                exit_code = ?output.status.code(),
                "Manim render failed"
            );
            return Err(MediaError::render_failed(
                format!("manim exited with {:?}", output.status.code()),
                format_render_output(&output.stdout, &output.stderr),
            ));
        }

        let artifact = find_artifact(output_dir, output_name)
            .await?
            .ok_or_else(|| MediaError::ArtifactNotFound(output_name.to_string()))?;

        info!(artifact = %artifact.display(), "Scene rendered");
        Ok(artifact)
    }
}

/// Name of the scene class to render: the first `class` line mentioning `Scene`.
pub fn detect_scene_class(source: &str) -> String {
    source
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("class ") && line.contains("Scene"))
        .find_map(|line| {
            let rest = line["class ".len()..].trim_start();
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            (!name.is_empty()).then_some(name)
        })
        .unwrap_or_else(|| DEFAULT_SCENE_CLASS.to_string())
}

/// Combine captured engine output into the text fed back for correction.
pub fn format_render_output(stdout: &str, stderr: &str) -> String {
    format!(
        "--- MANIM STDOUT ---\n{}\n\n--- MANIM STDERR ---\n{}",
        stdout, stderr
    )
}

/// Find `file_name` anywhere below `root`, skipping partial segments.
pub async fn find_artifact(root: &Path, file_name: &str) -> MediaResult<Option<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if entry.file_name() != PARTIAL_MOVIE_DIR {
                    pending.push(path);
                }
            } else if entry.file_name() == file_name {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_scene_class() {
        let source = "from manim import *\n\nclass Helper:\n    pass\n\nclass FourierScene(Scene):\n    def construct(self):\n        pass\n";
        assert_eq!(detect_scene_class(source), "FourierScene");

        let moving = "class Intro(MovingCameraScene):\n    pass";
        assert_eq!(detect_scene_class(moving), "Intro");

        assert_eq!(detect_scene_class("print('no scene')"), "Scene");
    }

    #[test]
    fn test_format_render_output() {
        let text = format_render_output("rendering", "Traceback: boom");
        assert!(text.starts_with("--- MANIM STDOUT ---\nrendering"));
        assert!(text.ends_with("--- MANIM STDERR ---\nTraceback: boom"));
    }

    #[test]
    fn test_manim_args() {
        let renderer = ManimRenderer::default();
        let args = renderer.build_args(Path::new("/tmp/s.py"), "Intro", Path::new("/out"), "clip_0.mp4");
        assert_eq!(
            args,
            vec!["-m", "manim", "/tmp/s.py", "Intro", "-o", "clip_0.mp4", "--media_dir", "/out", "-v", "WARNING", "-ql"]
        );
    }

    #[tokio::test]
    async fn test_find_artifact_skips_partials() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("videos/scene_x/480p15").join(PARTIAL_MOVIE_DIR);
        std::fs::create_dir_all(&partial).unwrap();
        std::fs::write(partial.join("clip_0.mp4"), b"partial").unwrap();

        assert!(find_artifact(dir.path(), "clip_0.mp4").await.unwrap().is_none());

        let final_path = dir.path().join("videos/scene_x/480p15/clip_0.mp4");
        std::fs::write(&final_path, b"final").unwrap();
        assert_eq!(find_artifact(dir.path(), "clip_0.mp4").await.unwrap(), Some(final_path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_render_reports_output_and_cleans_script() {
        let dir = TempDir::new().unwrap();
        let renderer = ManimRenderer::new(RenderConfig {
            // `false` ignores its arguments and exits 1.
            python: "false".to_string(),
            ..RenderConfig::default()
        });

        let err = renderer
            .render("class A(Scene): pass", dir.path(), "clip_0.mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::RenderFailed { .. }));
        assert!(err.feedback_text().contains("--- MANIM STDERR ---"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
