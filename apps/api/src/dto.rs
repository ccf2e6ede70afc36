mod api_keys;
mod audit;
mod health;
mod members;
mod organizations;
mod security_policy;
mod threats;

pub use api_keys::{ApiKeyResponse, CreateApiKeyRequest, IssuedApiKeyResponse};
pub use audit::{
    ArchiveOutcomeResponse, AuditRecordListParams, AuditRecordResponse, VerificationResponse,
};
pub use health::{HealthDependencyStatus, HealthResponse};
pub use members::{
    InviteMemberRequest, MemberResponse, RevokeSessionsRequest, SessionRevocationResponse,
};
pub use organizations::{
    ConfirmDomainVerificationRequest, DnsChallengeRecord, DomainChallengeResponse,
    DomainVerificationRequest, OnboardOrganizationRequest, OnboardOrganizationResponse,
    OnboardingStatusResponse, OnboardingStepResponse, OrganizationResponse,
};
pub use security_policy::{SecurityPolicyResponse, UpdateSecurityPolicyRequest};
pub use threats::{
    FlagFalsePositiveRequest, IngestThreatRequest, SeverityCountResponse, ThreatListParams,
    ThreatResponse, ThreatSummaryParams, ThreatSummaryResponse,
};

use chrono::{DateTime, Utc};
use sentinel_core::AppError;

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| AppError::Validation(format!("invalid {field} '{value}': {error}")))
}
