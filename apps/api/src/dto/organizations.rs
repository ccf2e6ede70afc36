use sentinel_application::{
    DNS_CHALLENGE_TTL_SECONDS, DomainChallenge, OnboardedOrganization, OnboardingStatus,
};
use sentinel_domain::Organization;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{AuditRecordResponse, MemberResponse, format_timestamp};

/// Incoming payload for organization onboarding.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/onboard-organization-request.ts"
)]
pub struct OnboardOrganizationRequest {
    pub name: String,
    pub domain: String,
    #[serde(default = "default_subscription_tier")]
    pub subscription_tier: String,
    pub admin_email: String,
    pub admin_full_name: String,
}

fn default_subscription_tier() -> String {
    "starter".to_owned()
}

/// API representation of an organization.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/organization-response.ts"
)]
pub struct OrganizationResponse {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub subscription_tier: String,
    pub is_active: bool,
    pub max_users: u32,
    pub max_api_calls_per_day: u32,
    pub enable_mfa: bool,
    pub enable_sso: bool,
    pub retention_days: u16,
    pub domain_verified_at: Option<String>,
    pub created_at: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(value: Organization) -> Self {
        let quotas = value.quotas();
        Self {
            id: value.id().to_string(),
            name: value.name().to_owned(),
            domain: value.domain().to_owned(),
            subscription_tier: value.subscription_tier().as_str().to_owned(),
            is_active: value.is_active(),
            max_users: quotas.max_users,
            max_api_calls_per_day: quotas.max_api_calls_per_day,
            enable_mfa: quotas.enable_mfa,
            enable_sso: quotas.enable_sso,
            retention_days: quotas.retention_days,
            domain_verified_at: value.domain_verified_at().map(format_timestamp),
            created_at: format_timestamp(value.created_at()),
        }
    }
}

/// Result of onboarding an organization.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/onboard-organization-response.ts"
)]
pub struct OnboardOrganizationResponse {
    pub organization: OrganizationResponse,
    pub admin: MemberResponse,
    pub audit_record: AuditRecordResponse,
}

impl From<OnboardedOrganization> for OnboardOrganizationResponse {
    fn from(value: OnboardedOrganization) -> Self {
        Self {
            organization: value.organization.into(),
            admin: value.admin.into(),
            audit_record: value.audit_record.into(),
        }
    }
}

/// Incoming payload for requesting a domain ownership challenge.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/domain-verification-request.ts"
)]
pub struct DomainVerificationRequest {
    #[serde(default = "default_verification_method")]
    pub method: String,
}

fn default_verification_method() -> String {
    "dns".to_owned()
}

/// DNS record the organization must publish.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/dns-challenge-record.ts"
)]
pub struct DnsChallengeRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
}

/// Issued domain ownership challenge. The token is shown only once.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/domain-challenge-response.ts"
)]
pub struct DomainChallengeResponse {
    pub method: String,
    pub status: String,
    pub domain: String,
    pub token: String,
    pub dns_record: Option<DnsChallengeRecord>,
    pub recipient: Option<String>,
    pub expires_at: String,
}

impl From<DomainChallenge> for DomainChallengeResponse {
    fn from(value: DomainChallenge) -> Self {
        Self {
            method: value.method.as_str().to_owned(),
            status: "pending".to_owned(),
            dns_record: value.dns_record_name.map(|name| DnsChallengeRecord {
                name,
                record_type: "TXT".to_owned(),
                value: value.token.clone(),
                ttl: DNS_CHALLENGE_TTL_SECONDS,
            }),
            domain: value.domain,
            token: value.token,
            recipient: value.recipient,
            expires_at: format_timestamp(value.expires_at),
        }
    }
}

/// Incoming payload for completing a domain ownership challenge.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/confirm-domain-verification-request.ts"
)]
pub struct ConfirmDomainVerificationRequest {
    pub token: String,
}

/// One onboarding step.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/onboarding-step-response.ts"
)]
pub struct OnboardingStepResponse {
    pub step: String,
    pub completed: bool,
}

/// Onboarding progress of the active organization.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/onboarding-status-response.ts"
)]
pub struct OnboardingStatusResponse {
    pub organization_name: String,
    pub domain: String,
    pub progress_percent: u8,
    pub steps: Vec<OnboardingStepResponse>,
    pub is_complete: bool,
    pub next_step: Option<String>,
}

impl From<OnboardingStatus> for OnboardingStatusResponse {
    fn from(value: OnboardingStatus) -> Self {
        Self {
            progress_percent: value.progress_percent(),
            is_complete: value.is_complete(),
            next_step: value.next_step().map(str::to_owned),
            steps: value
                .steps
                .iter()
                .map(|step| OnboardingStepResponse {
                    step: step.step.to_owned(),
                    completed: step.completed,
                })
                .collect(),
            organization_name: value.organization_name,
            domain: value.domain,
        }
    }
}
