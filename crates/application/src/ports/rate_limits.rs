use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::AppResult;

/// Counter state of one fixed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Attempts in the current window, including the one just recorded.
    pub attempt_count: i64,
    /// Start of the current window.
    pub window_started_at: DateTime<Utc>,
}

/// Repository port for request counters.
///
/// Keys are opaque to the adapter. Counters are not tenant content and are
/// not audited.
#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Counts one attempt for `key`, opening a new window when the current
    /// one is older than `window_seconds`.
    async fn record_attempt(&self, key: &str, window_seconds: i64) -> AppResult<AttemptInfo>;

    /// Removes windows that started before `before`.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> AppResult<u64>;
}
