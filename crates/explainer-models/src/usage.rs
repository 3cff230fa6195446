//! Per-user usage statistics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Snapshot of a user's generation usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UsageStats {
    pub daily_limit: u32,
    /// Jobs started in the last 24 hours
    pub today_count: u32,
    pub remaining_today: u32,
    pub currently_generating: u32,
    pub max_concurrent: u32,
    /// Jobs started since the process came up
    pub total: u32,
    pub completed: u32,
}

impl UsageStats {
    pub fn can_start(&self) -> bool {
        self.remaining_today > 0 && self.currently_generating < self.max_concurrent
    }
}
