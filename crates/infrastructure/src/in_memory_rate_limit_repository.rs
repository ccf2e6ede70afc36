use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sentinel_application::ports::{AttemptInfo, RateLimitRepository};
use sentinel_core::AppResult;
use tokio::sync::RwLock;

/// Process-local request counters.
#[derive(Default)]
pub struct InMemoryRateLimitRepository {
    windows: RwLock<HashMap<String, AttemptInfo>>,
}

impl InMemoryRateLimitRepository {
    /// Creates an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitRepository for InMemoryRateLimitRepository {
    async fn record_attempt(&self, key: &str, window_seconds: i64) -> AppResult<AttemptInfo> {
        let now = Utc::now();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_owned()).or_insert(AttemptInfo {
            attempt_count: 0,
            window_started_at: now,
        });

        let window_end = window
            .window_started_at
            .checked_add_signed(Duration::seconds(window_seconds))
            .unwrap_or(now);
        if window_end < now {
            window.attempt_count = 0;
            window.window_started_at = now;
        }
        window.attempt_count = window.attempt_count.saturating_add(1);

        Ok(window.clone())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut windows = self.windows.write().await;
        let before_count = windows.len();
        windows.retain(|_, window| window.window_started_at >= before);

        Ok((before_count - windows.len()) as u64)
    }
}
