//! Fixed-window request throttling and the per-tenant daily API quota.
//!
//! Counters live behind [`RateLimitRepository`]. When the counter store is
//! unavailable requests are admitted and a warning is logged.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sentinel_core::{AppError, AppResult, TenantContext};
use tracing::warn;

use crate::ports::{OrganizationRepository, RateLimitRepository};

/// Requests a single client may send per window by default.
pub const DEFAULT_CLIENT_RATE_LIMIT_REQUESTS: i64 = 100;

/// Default client window length.
pub const DEFAULT_CLIENT_RATE_LIMIT_WINDOW_SECONDS: i64 = 60;

const DAILY_QUOTA_WINDOW_SECONDS: i64 = 86_400;
const EXPIRED_WINDOW_RETENTION_HOURS: i64 = 24;

/// Limit applied to one category of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Key prefix, e.g. `client` or `api_calls`.
    pub category: String,
    /// Attempts allowed per window.
    pub max_attempts: i64,
    /// Window length in seconds.
    pub window_seconds: i64,
}

impl RateLimitRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(category: impl Into<String>, max_attempts: i64, window_seconds: i64) -> Self {
        Self {
            category: category.into(),
            max_attempts,
            window_seconds,
        }
    }

    /// Default per-client rule.
    #[must_use]
    pub fn client_default() -> Self {
        Self::new(
            "client",
            DEFAULT_CLIENT_RATE_LIMIT_REQUESTS,
            DEFAULT_CLIENT_RATE_LIMIT_WINDOW_SECONDS,
        )
    }
}

/// Application service for request throttling.
#[derive(Clone)]
pub struct RateLimitService {
    repository: Arc<dyn RateLimitRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    client_rule: RateLimitRule,
    enabled: bool,
}

impl RateLimitService {
    /// Creates an enabled service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RateLimitRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        client_rule: RateLimitRule,
    ) -> Self {
        Self {
            repository,
            organizations,
            client_rule,
            enabled: true,
        }
    }

    /// Turns every check into a no-op when `enabled` is false.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Records an attempt for `{category}:{key}` and rejects it once the
    /// rule's window is exhausted.
    pub async fn check_rate_limit(&self, rule: &RateLimitRule, key: &str) -> AppResult<()> {
        let composite_key = format!("{}:{key}", rule.category);
        let info = self
            .repository
            .record_attempt(&composite_key, rule.window_seconds)
            .await?;

        if info.attempt_count > rule.max_attempts {
            return Err(AppError::RateLimited(format!(
                "more than {} requests in {} seconds",
                rule.max_attempts, rule.window_seconds
            )));
        }

        Ok(())
    }

    /// Throttles one client, identified by its forwarded address.
    pub async fn check_client(&self, client_key: &str) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        admit_on_store_failure(
            self.check_rate_limit(&self.client_rule, client_key).await,
            &self.client_rule.category,
        )
    }

    /// Counts one API call against the tenant's `max_api_calls_per_day`.
    ///
    /// Days are UTC calendar days.
    pub async fn enforce_daily_quota(&self, context: &TenantContext) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let organization = self.organizations.find_organization(context).await?;
        let max_calls = organization.quotas().max_api_calls_per_day;
        let rule = RateLimitRule::new(
            "api_calls",
            i64::from(max_calls),
            DAILY_QUOTA_WINDOW_SECONDS,
        );
        let key = format!("{}:{}", context.tenant_id(), Utc::now().date_naive());

        match self.check_rate_limit(&rule, key.as_str()).await {
            Err(AppError::RateLimited(_)) => Err(AppError::RateLimited(format!(
                "daily API call quota of {max_calls} exceeded"
            ))),
            other => admit_on_store_failure(other, &rule.category),
        }
    }

    /// Removes windows older than a day. Returns the number removed.
    pub async fn cleanup(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::hours(EXPIRED_WINDOW_RETENTION_HOURS);
        self.repository.cleanup_expired(cutoff).await
    }
}

fn admit_on_store_failure(result: AppResult<()>, category: &str) -> AppResult<()> {
    match result {
        Err(AppError::RateLimited(message)) => Err(AppError::RateLimited(message)),
        Err(error) => {
            warn!(category, %error, "rate limit counter unavailable, admitting request");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use sentinel_core::AppError;
    use sentinel_domain::{MemberRole, Organization, OrganizationQuotas};

    use super::{RateLimitRule, RateLimitService};
    use crate::ports::AttemptInfo;
    use crate::test_support::FakeStore;

    fn service(store: &Arc<FakeStore>, client_rule: RateLimitRule) -> RateLimitService {
        RateLimitService::new(store.clone(), store.clone(), client_rule)
    }

    async fn limit_daily_calls(store: &FakeStore, max_api_calls_per_day: u32) {
        let mut organizations = store.organizations.lock().await;
        for organization in organizations.iter_mut() {
            let quotas = OrganizationQuotas {
                max_api_calls_per_day,
                ..organization.quotas().clone()
            };
            *organization = Organization::from_parts(
                organization.id(),
                organization.name().to_owned(),
                organization.domain().to_owned(),
                organization.subscription_tier(),
                organization.is_active(),
                quotas,
                organization.created_at(),
            )
            .unwrap_or_else(|_| unreachable!());
        }
    }

    #[tokio::test]
    async fn clients_are_throttled_independently() {
        let store = Arc::new(FakeStore::default());
        let service = service(&store, RateLimitRule::new("client", 3, 60));

        for _ in 0..3 {
            assert!(service.check_client("203.0.113.7").await.is_ok());
        }

        let fourth = service.check_client("203.0.113.7").await;
        assert!(matches!(fourth, Err(AppError::RateLimited(_))));
        assert!(service.check_client("203.0.113.8").await.is_ok());
    }

    #[tokio::test]
    async fn daily_quota_follows_the_organization_setting() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;
        let (other, _) = store.seed_tenant(MemberRole::Analyst).await;
        limit_daily_calls(&store, 2).await;
        let service = service(&store, RateLimitRule::client_default());

        assert!(service.enforce_daily_quota(&context).await.is_ok());
        assert!(service.enforce_daily_quota(&context).await.is_ok());
        let third = service.enforce_daily_quota(&context).await;

        assert!(
            matches!(third, Err(AppError::RateLimited(message)) if message.contains("quota of 2"))
        );
        assert!(service.enforce_daily_quota(&other).await.is_ok());
    }

    #[tokio::test]
    async fn disabled_service_admits_everything() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;
        limit_daily_calls(&store, 0).await;
        let service = service(&store, RateLimitRule::new("client", 0, 60)).with_enabled(false);

        assert!(service.check_client("203.0.113.7").await.is_ok());
        assert!(service.enforce_daily_quota(&context).await.is_ok());
        assert!(store.windows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unavailable_counters_admit_requests() {
        let store = Arc::new(FakeStore::default());
        *store.rate_limits_unavailable.lock().await = true;
        let service = service(&store, RateLimitRule::new("client", 0, 60));

        assert!(service.check_client("203.0.113.7").await.is_ok());
        assert!(matches!(
            service
                .check_rate_limit(&RateLimitRule::new("client", 0, 60), "203.0.113.7")
                .await,
            Err(AppError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn cleanup_drops_windows_older_than_a_day() {
        let store = Arc::new(FakeStore::default());
        store.windows.lock().await.insert(
            "client:stale".to_owned(),
            AttemptInfo {
                attempt_count: 4,
                window_started_at: Utc::now() - Duration::hours(30),
            },
        );
        let service = service(&store, RateLimitRule::client_default());
        assert!(service.check_client("fresh").await.is_ok());

        let removed = service.cleanup().await;

        assert_eq!(removed.ok(), Some(1));
        let windows = store.windows.lock().await;
        assert!(windows.contains_key("client:fresh"));
        assert!(!windows.contains_key("client:stale"));
    }
}
