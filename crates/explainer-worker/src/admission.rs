//! Admission control: per-user daily and concurrent generation limits.
//!
//! Checking and recording happen under one lock, so two submissions racing
//! for a user's last slot cannot both get in.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use explainer_models::{JobId, UsageStats, VideoStatus};

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Daily limit reached ({limit} videos per 24 hours)")]
    DailyLimitReached { limit: u32 },

    #[error("Too many videos generating ({limit} at a time)")]
    TooManyGenerating { limit: u32 },

    #[error("A video for concept {concept_id} is already generating (job {job_id})")]
    AlreadyGenerating { concept_id: String, job_id: JobId },

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("Could not record job: {0}")]
    Store(String),
}

impl AdmissionError {
    /// Label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::InvalidRequest(_) => "invalid_request",
            AdmissionError::DailyLimitReached { .. } => "daily_limit",
            AdmissionError::TooManyGenerating { .. } => "concurrent_limit",
            AdmissionError::AlreadyGenerating { .. } => "already_generating",
            AdmissionError::ShuttingDown => "shutting_down",
            AdmissionError::Store(_) => "store",
        }
    }
}

impl From<explainer_models::ModelError> for AdmissionError {
    fn from(e: explainer_models::ModelError) -> Self {
        AdmissionError::InvalidRequest(e.to_string())
    }
}

/// How an admitted job ended, as far as usage accounting cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    Completed,
    Failed,
    /// Admitted but never started; the daily slot is given back
    Withdrawn,
}

impl From<VideoStatus> for UsageOutcome {
    fn from(status: VideoStatus) -> Self {
        match status {
            VideoStatus::Completed => UsageOutcome::Completed,
            _ => UsageOutcome::Failed,
        }
    }
}

/// Per-user admission limits.
#[async_trait]
pub trait UsageGate: Send + Sync {
    /// Check both limits and, if they pass, count the job as started.
    async fn try_admit(&self, user_id: &str) -> Result<(), AdmissionError>;

    /// Release the generating slot taken by `try_admit`.
    async fn release(&self, user_id: &str, outcome: UsageOutcome);

    async fn usage(&self, user_id: &str) -> UsageStats;
}

#[derive(Debug, Default)]
struct UserUsage {
    starts: VecDeque<DateTime<Utc>>,
    generating: u32,
    total: u32,
    completed: u32,
}

impl UserUsage {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(24);
        while self.starts.front().is_some_and(|t| *t <= cutoff) {
            self.starts.pop_front();
        }
    }

    fn today(&self) -> u32 {
        self.starts.len() as u32
    }

    fn is_idle(&self) -> bool {
        self.starts.is_empty() && self.generating == 0
    }
}

/// Usage gate kept in process memory with a rolling 24-hour window.
///
/// A user with nothing generating and no start inside the window is
/// forgotten on the next admission, lifetime counters included.
pub struct InMemoryUsageGate {
    daily_limit: u32,
    max_generating: u32,
    users: Mutex<HashMap<String, UserUsage>>,
}

impl InMemoryUsageGate {
    pub fn new(daily_limit: u32, max_generating: u32) -> Self {
        Self {
            daily_limit,
            max_generating,
            users: Mutex::new(HashMap::new()),
        }
    }

    async fn try_admit_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), AdmissionError> {
        let mut users = self.users.lock().await;
        users.retain(|_, usage| {
            usage.prune(now);
            !usage.is_idle()
        });
        let usage = users.entry(user_id.to_string()).or_default();

        if usage.today() >= self.daily_limit {
            return Err(AdmissionError::DailyLimitReached {
                limit: self.daily_limit,
            });
        }
        if usage.generating >= self.max_generating {
            return Err(AdmissionError::TooManyGenerating {
                limit: self.max_generating,
            });
        }

        usage.starts.push_back(now);
        usage.generating += 1;
        usage.total += 1;
        Ok(())
    }

    async fn usage_at(&self, user_id: &str, now: DateTime<Utc>) -> UsageStats {
        let mut users = self.users.lock().await;
        let (today, generating, total, completed) = match users.get_mut(user_id) {
            Some(usage) => {
                usage.prune(now);
                (usage.today(), usage.generating, usage.total, usage.completed)
            }
            None => (0, 0, 0, 0),
        };

        UsageStats {
            daily_limit: self.daily_limit,
            today_count: today,
            remaining_today: self.daily_limit.saturating_sub(today),
            currently_generating: generating,
            max_concurrent: self.max_generating,
            total,
            completed,
        }
    }
}

#[async_trait]
impl UsageGate for InMemoryUsageGate {
    async fn try_admit(&self, user_id: &str) -> Result<(), AdmissionError> {
        self.try_admit_at(user_id, Utc::now()).await
    }

    async fn release(&self, user_id: &str, outcome: UsageOutcome) {
        let mut users = self.users.lock().await;
        let Some(usage) = users.get_mut(user_id) else {
            return;
        };
        usage.generating = usage.generating.saturating_sub(1);
        match outcome {
            UsageOutcome::Completed => usage.completed += 1,
            UsageOutcome::Failed => {}
            UsageOutcome::Withdrawn => {
                usage.starts.pop_back();
                usage.total = usage.total.saturating_sub(1);
            }
        }
    }

    async fn usage(&self, user_id: &str) -> UsageStats {
        self.usage_at(user_id, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_limit() {
        let gate = InMemoryUsageGate::new(10, 2);
        gate.try_admit("u").await.unwrap();
        gate.try_admit("u").await.unwrap();

        assert_eq!(
            gate.try_admit("u").await,
            Err(AdmissionError::TooManyGenerating { limit: 2 })
        );
        // Other users are unaffected.
        gate.try_admit("v").await.unwrap();

        gate.release("u", UsageOutcome::Completed).await;
        gate.try_admit("u").await.unwrap();

        let stats = gate.usage("u").await;
        assert_eq!(stats.currently_generating, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total, 3);
    }

    #[tokio::test]
    async fn test_daily_limit_counts_finished_jobs() {
        let gate = InMemoryUsageGate::new(2, 5);
        for _ in 0..2 {
            gate.try_admit("u").await.unwrap();
            gate.release("u", UsageOutcome::Failed).await;
        }

        assert_eq!(
            gate.try_admit("u").await,
            Err(AdmissionError::DailyLimitReached { limit: 2 })
        );
        let stats = gate.usage("u").await;
        assert_eq!(stats.remaining_today, 0);
        assert!(!stats.can_start());
    }

    #[tokio::test]
    async fn test_daily_window_rolls() {
        let gate = InMemoryUsageGate::new(1, 5);
        let yesterday = Utc::now() - Duration::hours(25);
        gate.try_admit_at("u", yesterday).await.unwrap();
        gate.release("u", UsageOutcome::Completed).await;

        gate.try_admit("u").await.unwrap();
        assert_eq!(gate.usage("u").await.today_count, 1);
    }

    #[tokio::test]
    async fn test_idle_users_are_forgotten() {
        let gate = InMemoryUsageGate::new(5, 3);
        let two_days_ago = Utc::now() - Duration::hours(48);
        for user in ["a", "b", "c"] {
            gate.try_admit_at(user, two_days_ago).await.unwrap();
        }
        gate.release("a", UsageOutcome::Completed).await;
        gate.release("b", UsageOutcome::Failed).await;

        gate.try_admit("d").await.unwrap();

        // "c" is still generating, so it stays.
        let users = gate.users.lock().await;
        let mut tracked: Vec<&str> = users.keys().map(String::as_str).collect();
        tracked.sort();
        assert_eq!(tracked, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_withdrawn_returns_daily_slot() {
        let gate = InMemoryUsageGate::new(1, 1);
        gate.try_admit("u").await.unwrap();
        gate.release("u", UsageOutcome::Withdrawn).await;

        let stats = gate.usage("u").await;
        assert_eq!(stats.today_count, 0);
        assert_eq!(stats.total, 0);
        gate.try_admit("u").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_user_usage() {
        let gate = InMemoryUsageGate::new(5, 3);
        let stats = gate.usage("nobody").await;
        assert_eq!(stats.remaining_today, 5);
        assert!(stats.can_start());
    }
}
