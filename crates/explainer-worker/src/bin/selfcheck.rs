use std::path::Path;

use explainer_media::{check_ffmpeg, check_ffprobe, check_program, RenderConfig, SpeechConfig};
use explainer_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "explainer-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.videos_dir).await?;
    ensure_dir(&config.jobs_dir).await?;
    ensure_media_tools()?;
    ensure_env_present(&["GEMINI_API_KEY"])?;

    println!("explainer-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_media_tools() -> anyhow::Result<()> {
    check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;

    let render = RenderConfig::from_env();
    check_program(&render.python)
        .map_err(|e| anyhow::anyhow!("render interpreter not available: {}", e))?;

    let speech = SpeechConfig::from_env();
    let program = speech
        .program()
        .ok_or_else(|| anyhow::anyhow!("TTS_COMMAND is empty"))?;
    check_program(program).map_err(|e| anyhow::anyhow!("speech command not available: {}", e))?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
