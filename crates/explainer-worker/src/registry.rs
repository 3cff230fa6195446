//! Live jobs and per-concept single-flight claims.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use explainer_models::JobId;

use crate::progress::ProgressChannel;

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<ProgressChannel>>>,
    /// Concept -> job currently generating it
    active: RwLock<HashMap<String, JobId>>,
    /// Concept -> most recently submitted job
    latest: RwLock<HashMap<String, JobId>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a concept for a job. Returns the holder if one is already generating.
    pub async fn claim(&self, concept_id: &str, job_id: &JobId) -> Result<(), JobId> {
        let mut active = self.active.write().await;
        if let Some(holder) = active.get(concept_id) {
            return Err(holder.clone());
        }
        active.insert(concept_id.to_string(), job_id.clone());
        Ok(())
    }

    /// Release a concept claim if `job_id` still holds it.
    pub async fn release(&self, concept_id: &str, job_id: &JobId) {
        let mut active = self.active.write().await;
        if active.get(concept_id) == Some(job_id) {
            active.remove(concept_id);
        }
    }

    pub async fn is_claimed(&self, concept_id: &str) -> bool {
        self.active.read().await.contains_key(concept_id)
    }

    pub async fn insert(&self, channel: Arc<ProgressChannel>) {
        self.latest
            .write()
            .await
            .insert(channel.concept_id().to_string(), channel.job_id().clone());
        self.jobs
            .write()
            .await
            .insert(channel.job_id().clone(), channel);
    }

    pub async fn get(&self, job_id: &JobId) -> Option<Arc<ProgressChannel>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Channel of the most recent job for a concept still held in memory.
    pub async fn latest_for_concept(&self, concept_id: &str) -> Option<Arc<ProgressChannel>> {
        let job_id = self.latest.read().await.get(concept_id).cloned()?;
        self.get(&job_id).await
    }

    /// Drop a job from memory. Its record remains in the store.
    pub async fn remove(&self, job_id: &JobId) -> Option<Arc<ProgressChannel>> {
        let removed = self.jobs.write().await.remove(job_id);
        self.latest.write().await.retain(|_, latest| latest != job_id);
        removed
    }

    /// Forget finished jobs, keeping their concept history only in the store.
    pub async fn evict_finished(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, channel| !channel.status().is_terminal());
        self.latest
            .write()
            .await
            .retain(|_, latest| jobs.contains_key(latest));
        before - jobs.len()
    }

    /// Jobs currently held in memory.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
