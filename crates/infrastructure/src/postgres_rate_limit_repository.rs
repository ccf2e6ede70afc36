use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{AttemptInfo, RateLimitRepository};
use sentinel_core::{AppError, AppResult};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed request counters in `rate_limit_windows`.
///
/// Counter rows are not tenant content, so no tenant scope is set.
#[derive(Clone)]
pub struct PostgresRateLimitRepository {
    pool: PgPool,
}

impl PostgresRateLimitRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    attempt_count: i64,
    window_started_at: DateTime<Utc>,
}

#[async_trait]
impl RateLimitRepository for PostgresRateLimitRepository {
    async fn record_attempt(&self, key: &str, window_seconds: i64) -> AppResult<AttemptInfo> {
        // A window older than $2 seconds restarts at 1.
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO rate_limit_windows (key, window_started_at, attempt_count)
            VALUES ($1, now(), 1)
            ON CONFLICT (key) DO UPDATE
            SET
                attempt_count = CASE
                    WHEN rate_limit_windows.window_started_at
                        + make_interval(secs => $2::float8) < now()
                    THEN 1
                    ELSE rate_limit_windows.attempt_count + 1
                END,
                window_started_at = CASE
                    WHEN rate_limit_windows.window_started_at
                        + make_interval(secs => $2::float8) < now()
                    THEN now()
                    ELSE rate_limit_windows.window_started_at
                END
            RETURNING attempt_count, window_started_at
            "#,
        )
        .bind(key)
        .bind(window_seconds as f64)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to record rate limit attempt: {error}"))
        })?;

        Ok(AttemptInfo {
            attempt_count: row.attempt_count,
            window_started_at: row.window_started_at,
        })
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM rate_limit_windows
            WHERE window_started_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to clean up rate limit windows: {error}"))
        })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use sentinel_application::ports::RateLimitRepository;
    use uuid::Uuid;

    use super::PostgresRateLimitRepository;
    use crate::postgres_test_support::test_pool;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_share_one_window() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let repository = Arc::new(PostgresRateLimitRepository::new(pool));
        let key = format!("client:{}", Uuid::new_v4());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let repository = Arc::clone(&repository);
                let key = key.clone();
                tokio::spawn(async move { repository.record_attempt(&key, 60).await })
            })
            .collect();
        for handle in handles {
            assert!(matches!(handle.await, Ok(Ok(_))));
        }

        let last = repository.record_attempt(&key, 60).await;
        assert_eq!(last.map(|info| info.attempt_count).ok(), Some(21));
    }

    #[tokio::test]
    async fn stale_windows_are_cleaned_up() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let repository = PostgresRateLimitRepository::new(pool.clone());
        let key = format!("client:{}", Uuid::new_v4());
        assert!(repository.record_attempt(&key, 60).await.is_ok());
        let aged = sqlx::query(
            "UPDATE rate_limit_windows SET window_started_at = now() - interval '2 days' WHERE key = $1",
        )
        .bind(&key)
        .execute(&pool)
        .await;
        assert!(aged.is_ok());

        let restarted = repository.record_attempt(&key, 60).await;
        assert_eq!(restarted.map(|info| info.attempt_count).ok(), Some(1));

        assert!(
            sqlx::query(
                "UPDATE rate_limit_windows SET window_started_at = now() - interval '2 days' WHERE key = $1",
            )
            .bind(&key)
            .execute(&pool)
            .await
            .is_ok()
        );
        let removed = repository
            .cleanup_expired(Utc::now() - Duration::hours(24))
            .await;
        assert!(removed.is_ok_and(|removed| removed >= 1));
    }
}
