//! Per-job progress and log channel.
//!
//! Each job owns one [`ProgressChannel`]: the live job record plus an
//! in-process broadcast of [`JobEvent`]s. Publishing never blocks and never
//! fails the job; events sent while nobody is subscribed are dropped, and a
//! slow observer sees `Lagged` rather than holding up the pipeline.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::trace;

use explainer_models::{
    format_log_line, GenerationJob, JobEvent, JobId, ProgressUpdate, Stage, VideoStatus,
};

/// Live state and event fan-out for one job.
#[derive(Debug)]
pub struct ProgressChannel {
    job_id: JobId,
    concept_id: String,
    sender: broadcast::Sender<JobEvent>,
    job: Mutex<GenerationJob>,
}

impl ProgressChannel {
    pub fn new(job: GenerationJob, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            job_id: job.id.clone(),
            concept_id: job.concept_id.clone(),
            sender,
            job: Mutex::new(job),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn concept_id(&self) -> &str {
        &self.concept_id
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event to current subscribers.
    pub fn publish(&self, event: JobEvent) {
        let event_type = event.type_str();
        if self.sender.send(event).is_err() {
            trace!(job_id = %self.job_id, event_type, "No subscribers for job event");
        }
    }

    /// Append a timestamped line to the job log and publish it.
    pub fn log(&self, message: impl AsRef<str>) {
        let timestamp = Utc::now();
        let line = format_log_line(timestamp, message.as_ref());
        self.lock().push_log(line.clone());
        self.publish(JobEvent::Log {
            message: line,
            timestamp,
        });
    }

    /// Publish a progress update.
    pub fn progress(&self, current: usize, total: usize, stage: Stage, detail: impl Into<String>) {
        self.publish(JobEvent::progress(ProgressUpdate::new(
            current, total, stage, detail,
        )));
    }

    /// Publish the terminal status of the job as it currently stands.
    pub fn publish_status(&self) {
        let view = self.lock().status_view();
        self.publish(JobEvent::status(
            view.video_status,
            view.video_path,
            view.error,
        ));
    }

    /// Mutate the job record.
    pub fn update<R>(&self, f: impl FnOnce(&mut GenerationJob) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the job record.
    pub fn snapshot(&self) -> GenerationJob {
        self.lock().clone()
    }

    pub fn status(&self) -> VideoStatus {
        self.lock().status
    }

    // Poisoned locks are recovered; no mutation spans an await.
    fn lock(&self) -> MutexGuard<'_, GenerationJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explainer_models::GenerationRequest;

    fn channel() -> ProgressChannel {
        let request = GenerationRequest::new("user-1", "concept-1", "Entropy", "Disorder grows.");
        ProgressChannel::new(GenerationJob::new(&request), 16)
    }

    #[tokio::test]
    async fn test_subscriber_receives_logs_and_progress() {
        let channel = channel();
        let mut rx = channel.subscribe();

        channel.log("Planned 3 scenes");
        channel.progress(1, 3, Stage::Rendering, "Scene 1");

        match rx.recv().await.unwrap() {
            JobEvent::Log { message, .. } => assert!(message.ends_with("] Planned 3 scenes")),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            JobEvent::Progress(update) => {
                assert_eq!(update.current, 1);
                assert_eq!(update.percent, 33);
                assert_eq!(update.stage, Stage::Rendering);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let channel = channel();
        assert_eq!(channel.subscriber_count(), 0);
        channel.log("nobody listening");
        channel.progress(0, 0, Stage::Splitting, "start");

        let job = channel.snapshot();
        assert_eq!(job.logs.len(), 1);
        assert!(job.logs[0].ends_with("] nobody listening"));
        assert!(job.logs[0].starts_with('['));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let request = GenerationRequest::new("u", "c", "n", "d");
        let channel = ProgressChannel::new(GenerationJob::new(&request), 2);
        let mut rx = channel.subscribe();

        for i in 0..5 {
            channel.log(format!("line {i}"));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(channel.snapshot().logs.len(), 5);
    }

    #[test]
    fn test_update_and_status() {
        let channel = channel();
        channel.update(|job| job.start()).unwrap();
        assert_eq!(channel.status(), VideoStatus::Generating);
    }
}
