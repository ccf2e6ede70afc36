use std::sync::Arc;

use sentinel_application::ports::{
    ApiKeyRepository, AuditTrailRepository, MemberRepository, OrganizationRepository,
    RateLimitRepository, SecurityPolicyRepository, TenantDirectory, ThreatRepository,
};
use sentinel_infrastructure::{
    PostgresApiKeyRepository, PostgresAuditTrailRepository, PostgresMemberRepository,
    PostgresRateLimitRepository, PostgresSecurityPolicyRepository, PostgresTenantRepository,
    PostgresThreatRepository,
};
use sqlx::PgPool;

pub(super) struct RepositorySet {
    pub(super) tenant_directory: Arc<dyn TenantDirectory>,
    pub(super) organization_repository: Arc<dyn OrganizationRepository>,
    pub(super) member_repository: Arc<dyn MemberRepository>,
    pub(super) threat_repository: Arc<dyn ThreatRepository>,
    pub(super) security_policy_repository: Arc<dyn SecurityPolicyRepository>,
    pub(super) api_key_repository: Arc<dyn ApiKeyRepository>,
    pub(super) audit_trail_repository: Arc<dyn AuditTrailRepository>,
    pub(super) rate_limit_repository: Arc<dyn RateLimitRepository>,
}

pub(super) fn build_repository_set(pool: &PgPool) -> RepositorySet {
    let tenant_repository = Arc::new(PostgresTenantRepository::new(pool.clone()));

    RepositorySet {
        tenant_directory: tenant_repository.clone(),
        organization_repository: tenant_repository,
        member_repository: Arc::new(PostgresMemberRepository::new(pool.clone())),
        threat_repository: Arc::new(PostgresThreatRepository::new(pool.clone())),
        security_policy_repository: Arc::new(PostgresSecurityPolicyRepository::new(pool.clone())),
        api_key_repository: Arc::new(PostgresApiKeyRepository::new(pool.clone())),
        audit_trail_repository: Arc::new(PostgresAuditTrailRepository::new(pool.clone())),
        rate_limit_repository: Arc::new(PostgresRateLimitRepository::new(pool.clone())),
    }
}

#[cfg(test)]
pub(super) fn build_in_memory_repository_set(
    store: Arc<sentinel_infrastructure::InMemoryTenantStore>,
) -> RepositorySet {
    RepositorySet {
        tenant_directory: store.clone(),
        organization_repository: store.clone(),
        member_repository: store.clone(),
        threat_repository: store.clone(),
        security_policy_repository: store.clone(),
        api_key_repository: store.clone(),
        audit_trail_repository: store,
        rate_limit_repository: Arc::new(sentinel_infrastructure::InMemoryRateLimitRepository::new()),
    }
}
