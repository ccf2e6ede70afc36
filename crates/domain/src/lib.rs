//! Domain entities, row isolation and the tenant audit chain.

#![forbid(unsafe_code)]

mod api_key;
mod audit;
mod isolation;
mod member;
mod organization;
mod security_policy;
mod threat;

pub use api_key::{API_KEY_PREFIX_LENGTH, ApiKey, hash_api_key};
pub use audit::{
    AuditActionType, AuditDraft, AuditRecord, AuditValue, AuditValues, ChainTail, ChainVerifier,
    Divergence, DivergenceReason, GENESIS_HASH, ResourceType, VerificationResult,
};
pub use isolation::{TenantScoped, admit_write, is_visible, not_found};
pub use member::{EmailAddress, Member, MemberRole};
pub use organization::{
    DEFAULT_RETENTION_DAYS, DOMAIN_CHALLENGE_LABEL, Organization, OrganizationQuotas,
    PendingDomainVerification, SubscriptionTier, VerificationMethod, hash_verification_token,
};
pub use security_policy::{AnomalySensitivity, SecurityPolicy, SecurityPolicySettings};
pub use threat::{ThreatLog, ThreatObservation, ThreatSeverity};
