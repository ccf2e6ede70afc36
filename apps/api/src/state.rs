use std::sync::Arc;

use sentinel_application::{
    ApiKeyService, AuditTrailService, DomainVerificationService, MemberService,
    OrganizationService, RateLimitService, SecurityPolicyService, TenantContextService,
    ThreatService,
};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub postgres_pool: PgPool,
    pub gateway_secret: Arc<str>,
    pub tenant_context_service: TenantContextService,
    pub organization_service: OrganizationService,
    pub domain_verification_service: DomainVerificationService,
    pub rate_limit_service: RateLimitService,
    pub member_service: MemberService,
    pub threat_service: ThreatService,
    pub security_policy_service: SecurityPolicyService,
    pub api_key_service: ApiKeyService,
    pub audit_trail_service: AuditTrailService,
}
