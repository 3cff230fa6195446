//! Concept video worker binary.
//!
//! Generates one video from the command line and streams its events to
//! stdout as JSON lines:
//!
//! ```text
//! explainer-worker <concept-name> <description | @file> [concept-id]
//! ```

use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use explainer_models::{GenerationRequest, JobEvent, VideoStatus};
use explainer_worker::{metrics, JobOrchestrator, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(VideoStatus::Completed) => info!("Worker shutdown complete"),
        Ok(status) => {
            error!(status = %status, "Video generation did not complete");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Worker error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in ["explainer=info", "hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<VideoStatus> {
    let request = request_from_args().await?;

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_ADDR is not a socket address")?;
        metrics::init_metrics(addr).context("failed to start metrics exporter")?;
        info!(%addr, "Serving Prometheus metrics");
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let orchestrator = JobOrchestrator::from_config(config).await?;
    let ticket = orchestrator.submit(request).await?;
    info!(job_id = %ticket.job_id, "Job submitted");

    let job_id = ticket.job_id.clone();
    let mut events = orchestrator
        .subscribe(&job_id)
        .await
        .ok_or_else(|| anyhow!("job {} vanished after admission", job_id))?;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{}", line);
                    }
                    if matches!(event, JobEvent::Status { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let status = tokio::select! {
        status = ticket.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            orchestrator.shutdown().await;
            orchestrator
                .status(&job_id)
                .await?
                .map(|view| view.video_status)
                .unwrap_or(VideoStatus::Failed)
        }
    };

    printer.await.ok();
    if let Some(view) = orchestrator.status(&job_id).await? {
        println!("{}", serde_json::to_string_pretty(&view)?);
    }
    Ok(status)
}

async fn request_from_args() -> anyhow::Result<GenerationRequest> {
    let mut args = std::env::args().skip(1);
    let usage = "usage: explainer-worker <concept-name> <description | @file> [concept-id]";

    let name = args.next().ok_or_else(|| anyhow!(usage))?;
    let description = args.next().ok_or_else(|| anyhow!(usage))?;
    let description = match description.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read description from {}", path))?,
        None => description,
    };
    let concept_id = args.next().unwrap_or_else(|| slugify(&name));
    let user_id = std::env::var("EXPLAINER_USER_ID").unwrap_or_else(|_| "local".to_string());

    Ok(GenerationRequest::new(user_id, concept_id, name, description))
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "concept".to_string()
    } else {
        slug
    }
}
