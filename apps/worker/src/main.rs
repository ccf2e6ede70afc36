//! SentinelShield compliance worker.
//!
//! Periodically verifies the audit chain of every active tenant, archives
//! records that fell out of the tenant's retention window and drops stale
//! request counters.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sentinel_application::{
    AccessService, AuditRetryPolicy, AuditTrailService, DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS,
    DEFAULT_VERIFY_PAGE_SIZE, RateLimitRule, RateLimitService, TenantContextService,
};
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::VerificationResult;
use sentinel_infrastructure::{
    PostgresAuditTrailRepository, PostgresMemberRepository, PostgresRateLimitRepository,
    PostgresTenantRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const WORKER_SUBJECT: &str = "retention-worker";

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    sweep_interval_seconds: u64,
    verify_page_size: u32,
    run_once: bool,
    audit_append_max_attempts: u32,
}

/// Per-sweep counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SweepSummary {
    tenants: usize,
    verified: usize,
    diverged: usize,
    failed: usize,
    archived_records: u64,
    expired_rate_limit_windows: u64,
}

#[derive(Clone)]
struct RetentionSweeper {
    tenants: TenantContextService,
    audit_trail: AuditTrailService,
    rate_limits: RateLimitService,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let sweeper = build_sweeper(pool, &config)?;

    info!(
        sweep_interval_seconds = config.sweep_interval_seconds,
        verify_page_size = config.verify_page_size,
        run_once = config.run_once,
        "sentinel-worker started"
    );

    loop {
        match sweeper.sweep().await {
            Ok(summary) => info!(
                tenants = summary.tenants,
                verified = summary.verified,
                diverged = summary.diverged,
                failed = summary.failed,
                archived_records = summary.archived_records,
                expired_rate_limit_windows = summary.expired_rate_limit_windows,
                "compliance sweep finished"
            ),
            Err(error) => error!(error = %error, "compliance sweep failed"),
        }

        if config.run_once {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_secs(config.sweep_interval_seconds)).await;
    }
}

impl RetentionSweeper {
    /// Verifies and archives every active tenant; one tenant's failure does
    /// not stop the others.
    async fn sweep(&self) -> AppResult<SweepSummary> {
        let tenant_ids = self.tenants.active_tenants().await?;
        let mut summary = SweepSummary {
            tenants: tenant_ids.len(),
            ..SweepSummary::default()
        };

        for tenant_id in tenant_ids {
            match self.sweep_tenant(tenant_id).await {
                Ok(TenantOutcome::Verified { archived_records }) => {
                    summary.verified += 1;
                    summary.archived_records += archived_records;
                }
                Ok(TenantOutcome::Diverged) => summary.diverged += 1,
                Err(error) => {
                    summary.failed += 1;
                    warn!(tenant_id = %tenant_id, error = %error, "tenant sweep failed");
                }
            }
        }

        match self.rate_limits.cleanup().await {
            Ok(removed) => summary.expired_rate_limit_windows = removed,
            Err(error) => warn!(error = %error, "rate limit cleanup failed"),
        }

        Ok(summary)
    }

    async fn sweep_tenant(&self, tenant_id: TenantId) -> AppResult<TenantOutcome> {
        let context = TenantContext::system(tenant_id, WORKER_SUBJECT);

        let verification = self.audit_trail.verify_chain(&context).await?;
        if let VerificationResult::Diverged(divergence) = verification {
            error!(
                tenant_id = %tenant_id,
                record_id = %divergence.record_id,
                sequence = divergence.sequence,
                reason = divergence.reason.as_str(),
                "audit chain diverged, archival skipped"
            );
            return Ok(TenantOutcome::Diverged);
        }

        let outcome = self.audit_trail.archive_expired(&context).await?;
        if outcome.archived_count > 0 {
            info!(
                tenant_id = %tenant_id,
                archived_count = outcome.archived_count,
                archived_through_sequence = outcome.archived_through_sequence,
                "archived expired audit records"
            );
        }

        Ok(TenantOutcome::Verified {
            archived_records: outcome.archived_count,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TenantOutcome {
    Verified { archived_records: u64 },
    Diverged,
}

fn build_sweeper(pool: PgPool, config: &WorkerConfig) -> AppResult<RetentionSweeper> {
    let tenant_repository = Arc::new(PostgresTenantRepository::new(pool.clone()));
    let retry = AuditRetryPolicy::new(config.audit_append_max_attempts)?;
    let access = AccessService::new(Arc::new(PostgresMemberRepository::new(pool.clone())));

    Ok(RetentionSweeper {
        tenants: TenantContextService::new(tenant_repository.clone()),
        rate_limits: RateLimitService::new(
            Arc::new(PostgresRateLimitRepository::new(pool.clone())),
            tenant_repository.clone(),
            RateLimitRule::client_default(),
        ),
        audit_trail: AuditTrailService::new(
            Arc::new(PostgresAuditTrailRepository::new(pool)),
            tenant_repository,
            access,
            retry,
        )
        .with_verify_page_size(config.verify_page_size),
    })
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let sweep_interval_seconds = parse_env_u64("WORKER_SWEEP_INTERVAL_SECONDS", 3_600)?;
        let verify_page_size = parse_env_u32("VERIFY_PAGE_SIZE", DEFAULT_VERIFY_PAGE_SIZE)?;
        let run_once = env::var("WORKER_RUN_ONCE")
            .unwrap_or_else(|_| "false".to_owned())
            .eq_ignore_ascii_case("true");
        let audit_append_max_attempts =
            parse_env_u32("AUDIT_APPEND_MAX_ATTEMPTS", DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS)?;

        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if verify_page_size == 0 {
            return Err(AppError::Validation(
                "VERIFY_PAGE_SIZE must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            sweep_interval_seconds,
            verify_page_size,
            run_once,
            audit_append_max_attempts,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sentinel_application::ports::RateLimitRepository;
    use sentinel_application::{
        AccessService, AuditRetryPolicy, AuditTrailService, OnboardOrganizationInput,
        OrganizationService, RateLimitRule, RateLimitService, TenantContextService,
    };
    use sentinel_core::TenantContext;
    use sentinel_domain::SubscriptionTier;
    use sentinel_infrastructure::{InMemoryRateLimitRepository, InMemoryTenantStore};

    use super::{RetentionSweeper, SweepSummary, WORKER_SUBJECT};

    fn sweeper(store: &Arc<InMemoryTenantStore>) -> RetentionSweeper {
        sweeper_with_counters(store, Arc::new(InMemoryRateLimitRepository::new()))
    }

    fn sweeper_with_counters(
        store: &Arc<InMemoryTenantStore>,
        counters: Arc<InMemoryRateLimitRepository>,
    ) -> RetentionSweeper {
        RetentionSweeper {
            tenants: TenantContextService::new(store.clone()),
            rate_limits: RateLimitService::new(
                counters,
                store.clone(),
                RateLimitRule::client_default(),
            ),
            audit_trail: AuditTrailService::new(
                store.clone(),
                store.clone(),
                AccessService::new(store.clone()),
                AuditRetryPolicy::default(),
            )
            .with_verify_page_size(2),
        }
    }

    async fn onboard(store: &Arc<InMemoryTenantStore>, domain: &str) -> TenantContext {
        let service = OrganizationService::new(
            store.clone(),
            AccessService::new(store.clone()),
            AuditRetryPolicy::default(),
        );
        let onboarded = service
            .onboard(OnboardOrganizationInput {
                name: "Acme".to_owned(),
                domain: domain.to_owned(),
                subscription_tier: SubscriptionTier::Starter,
                admin_email: format!("admin@{domain}"),
                admin_full_name: "Ada Admin".to_owned(),
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap_or_else(|_| unreachable!());

        TenantContext::system(onboarded.organization.id(), WORKER_SUBJECT)
    }

    #[tokio::test]
    async fn sweep_verifies_every_active_tenant() {
        let store = Arc::new(InMemoryTenantStore::new());
        let _acme = onboard(&store, "acme.test").await;
        let _initech = onboard(&store, "initech.test").await;

        let summary = sweeper(&store).sweep().await;
        assert_eq!(
            summary.ok(),
            Some(SweepSummary {
                tenants: 2,
                verified: 2,
                diverged: 0,
                failed: 0,
                archived_records: 0,
                expired_rate_limit_windows: 0,
            })
        );
    }

    #[tokio::test]
    async fn sweep_with_no_tenants_is_empty() {
        let store = Arc::new(InMemoryTenantStore::new());

        let summary = sweeper(&store).sweep().await;
        assert_eq!(summary.ok(), Some(SweepSummary::default()));
    }

    #[tokio::test]
    async fn sweep_keeps_live_request_counters() {
        let store = Arc::new(InMemoryTenantStore::new());
        let counters = Arc::new(InMemoryRateLimitRepository::new());
        assert!(counters.record_attempt("client:198.51.100.1", 60).await.is_ok());
        let sweeper = sweeper_with_counters(&store, counters.clone());

        let fresh = sweeper.sweep().await;
        assert_eq!(
            fresh.ok().map(|summary| summary.expired_rate_limit_windows),
            Some(0)
        );

        let next = counters.record_attempt("client:198.51.100.1", 60).await;
        assert_eq!(next.map(|info| info.attempt_count).ok(), Some(2));
    }
}
