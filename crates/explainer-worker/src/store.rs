//! Job persistence.
//!
//! The store is the durable view of a job: it receives the GENERATING record
//! at admission and the terminal record at the end. Live progress is served
//! from the in-memory registry instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use explainer_models::{GenerationJob, JobId};

use crate::error::{WorkerError, WorkerResult};

/// Durable job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job: &GenerationJob) -> WorkerResult<()>;

    async fn load(&self, job_id: &JobId) -> WorkerResult<Option<GenerationJob>>;

    /// Most recently created job for a concept.
    async fn latest_for_concept(&self, concept_id: &str) -> WorkerResult<Option<GenerationJob>>;
}

/// Store kept in process memory.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, GenerationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &GenerationJob) -> WorkerResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> WorkerResult<Option<GenerationJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn latest_for_concept(&self, concept_id: &str) -> WorkerResult<Option<GenerationJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.concept_id == concept_id)
            .max_by_key(|j| j.created_at)
            .cloned())
    }
}

/// One JSON file per job under a directory.
///
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// never sees a partial record.
pub struct JsonFileJobStore {
    dir: PathBuf,
}

impl JsonFileJobStore {
    pub async fn open(dir: impl Into<PathBuf>) -> WorkerResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id.as_str()))
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn save(&self, job: &GenerationJob) -> WorkerResult<()> {
        let path = self.path_for(&job.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(job)?;

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            WorkerError::store(format!("Failed to commit {}: {}", path.display(), e))
        })?;
        debug!(job_id = %job.id, status = %job.status, "Persisted job");
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> WorkerResult<Option<GenerationJob>> {
        match tokio::fs::read(self.path_for(job_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_for_concept(&self, concept_id: &str) -> WorkerResult<Option<GenerationJob>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut latest: Option<GenerationJob> = None;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let job: GenerationJob = match tokio::fs::read(&path)
                .await
                .map_err(WorkerError::from)
                .and_then(|b| serde_json::from_slice(&b).map_err(WorkerError::from))
            {
                Ok(job) => job,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                    continue;
                }
            };
            if job.concept_id != concept_id {
                continue;
            }
            if latest.as_ref().map_or(true, |l| job.created_at > l.created_at) {
                latest = Some(job);
            }
        }

        Ok(latest)
    }
}
