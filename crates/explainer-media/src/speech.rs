//! Narration synthesis through a command-line TTS tool.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::file_size;
use crate::process::run_process;

const TEXT_PLACEHOLDER: &str = "{text}";
const OUTPUT_PLACEHOLDER: &str = "{output}";
const DEFAULT_TTS_COMMAND: &str = "edge-tts --text {text} --write-media {output}";

/// Turns narration text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output_path: &Path) -> MediaResult<()>;
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Whitespace-separated command; `{text}` and `{output}` are substituted per argument
    pub command: String,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TTS_COMMAND.to_string(),
            timeout_secs: 120,
        }
    }
}

impl SpeechConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command: std::env::var("TTS_COMMAND").unwrap_or(defaults.command),
            timeout_secs: std::env::var("TTS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Program name of the configured command.
    pub fn program(&self) -> Option<&str> {
        self.command.split_whitespace().next()
    }
}

/// [`SpeechSynthesizer`] that runs a configurable CLI per narration.
#[derive(Debug, Clone, Default)]
pub struct CommandSpeechSynthesizer {
    config: SpeechConfig,
}

impl CommandSpeechSynthesizer {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    /// Expand the command template for one narration.
    fn expand(&self, text: &str, output_path: &Path) -> MediaResult<(String, Vec<String>)> {
        let output = output_path.to_string_lossy();
        let mut parts = self.config.command.split_whitespace().map(|part| {
            part.replace(TEXT_PLACEHOLDER, text)
                .replace(OUTPUT_PLACEHOLDER, &output)
        });

        let program = parts
            .next()
            .ok_or_else(|| MediaError::speech_failed("TTS command is empty"))?;
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeechSynthesizer {
    async fn synthesize(&self, text: &str, output_path: &Path) -> MediaResult<()> {
        if text.trim().is_empty() {
            return Err(MediaError::speech_failed("Narration text is empty"));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (program, args) = self.expand(text, output_path)?;
        debug!(program = %program, output = %output_path.display(), "Synthesizing narration");

        let output = run_process(
            &program,
            &args,
            Some(Duration::from_secs(self.config.timeout_secs)),
        )
        .await?;

        if !output.success() {
            return Err(MediaError::speech_failed(format!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                output.stderr_tail(500)
            )));
        }

        match file_size(output_path).await {
            Some(size) if size > 0 => Ok(()),
            _ => Err(MediaError::speech_failed(format!(
                "{} produced no audio at {}",
                program,
                output_path.display()
            ))),
        }
    }
}
