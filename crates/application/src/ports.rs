mod api_keys;
mod audit;
mod members;
mod organizations;
mod rate_limits;
mod security_policy;
mod tenancy;
mod threats;

pub use api_keys::ApiKeyRepository;
pub use audit::{ArchiveBatch, AuditRecordQuery, AuditTrailRepository};
pub use members::{MemberRepository, RevokedSessions};
pub use organizations::{OrganizationOnboarding, OrganizationRepository};
pub use rate_limits::{AttemptInfo, RateLimitRepository};
pub use security_policy::SecurityPolicyRepository;
pub use tenancy::{GatewayAssertion, TenantDirectory, TenantMembership};
pub use threats::{SeverityCount, ThreatQuery, ThreatRepository};
