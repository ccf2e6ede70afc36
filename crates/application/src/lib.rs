//! Application services and ports.
//!
//! Every tenant-scoped port method takes the caller's [`TenantContext`]
//! explicitly. Adapters restrict reads and writes to that tenant and persist
//! audited mutations together with their audit record.
//!
//! [`TenantContext`]: sentinel_core::TenantContext

#![forbid(unsafe_code)]

mod access_service;
mod api_key_service;
mod audit_retry;
mod audit_trail_service;
mod domain_verification_service;
mod member_service;
mod organization_service;
mod rate_limit_service;
mod security_policy_service;
mod tenant_context_service;
mod threat_service;

/// Repository ports implemented by infrastructure adapters.
pub mod ports;

#[cfg(test)]
mod test_support;

pub use access_service::AccessService;
pub use api_key_service::{ApiKeyService, CreateApiKeyInput, IssuedApiKey};
pub use audit_retry::{AuditRetryPolicy, DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS};
pub use audit_trail_service::{
    ArchiveOutcome, AuditTrailService, DEFAULT_VERIFY_PAGE_SIZE, MAX_AUDIT_OFFSET,
    MAX_AUDIT_PAGE_SIZE,
};
pub use domain_verification_service::{
    DNS_CHALLENGE_TTL_SECONDS, DomainChallenge, DomainVerificationService, OnboardingStatus,
    OnboardingStep,
};
pub use member_service::{InviteMemberInput, MemberService, SessionRevocation};
pub use organization_service::{
    OnboardOrganizationInput, OnboardedOrganization, OrganizationService,
};
pub use rate_limit_service::{
    DEFAULT_CLIENT_RATE_LIMIT_REQUESTS, DEFAULT_CLIENT_RATE_LIMIT_WINDOW_SECONDS,
    RateLimitRule, RateLimitService,
};
pub use security_policy_service::SecurityPolicyService;
pub use tenant_context_service::TenantContextService;
pub use threat_service::{
    MAX_THREAT_PAGE_SIZE, MAX_THREAT_WINDOW_DAYS, ThreatListQuery, ThreatService,
};
