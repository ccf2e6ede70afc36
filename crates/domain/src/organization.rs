//! Organizations are the isolation boundary of the platform.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sentinel_core::{AppError, AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TenantScoped;

mod domain_ownership;

pub use domain_ownership::{
    DOMAIN_CHALLENGE_LABEL, PendingDomainVerification, VerificationMethod,
    hash_verification_token,
};

/// Default audit retention window for new organizations.
pub const DEFAULT_RETENTION_DAYS: u16 = 90;

/// Commercial plan of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Entry plan.
    Starter,
    /// Mid-size plan.
    Professional,
    /// Unlimited plan.
    Enterprise,
}

impl SubscriptionTier {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Returns the default seat limit for this plan.
    #[must_use]
    pub fn default_max_users(&self) -> u32 {
        match self {
            Self::Starter => 10,
            Self::Professional => 100,
            Self::Enterprise => 10_000,
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(AppError::Validation(format!(
                "unknown subscription tier '{value}'"
            ))),
        }
    }
}

/// Quota and policy switches attached to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationQuotas {
    /// Maximum number of members.
    pub max_users: u32,
    /// Maximum API calls per day.
    pub max_api_calls_per_day: u32,
    /// Whether members must enroll MFA.
    pub enable_mfa: bool,
    /// Whether SSO is enabled.
    pub enable_sso: bool,
    /// Audit records older than this many days are archived.
    pub retention_days: u16,
}

impl OrganizationQuotas {
    /// Returns the default quotas for a subscription tier.
    #[must_use]
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        Self {
            max_users: tier.default_max_users(),
            max_api_calls_per_day: 10_000,
            enable_mfa: false,
            enable_sso: false,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Rejects a new member once the seat limit is reached.
    pub fn admit_member(&self, current_members: u64) -> AppResult<()> {
        if current_members >= u64::from(self.max_users) {
            return Err(AppError::Conflict(format!(
                "organization member limit of {} reached",
                self.max_users
            )));
        }

        Ok(())
    }
}

/// One customer organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    id: TenantId,
    name: NonEmptyString,
    domain: String,
    subscription_tier: SubscriptionTier,
    is_active: bool,
    quotas: OrganizationQuotas,
    pending_verification: Option<PendingDomainVerification>,
    domain_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Organization {
    /// Creates a new active organization.
    pub fn new(
        id: TenantId,
        name: impl Into<String>,
        domain: impl Into<String>,
        subscription_tier: SubscriptionTier,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            domain: normalize_domain(domain.into().as_str())?,
            subscription_tier,
            is_active: true,
            quotas: OrganizationQuotas::for_tier(subscription_tier),
            pending_verification: None,
            domain_verified_at: None,
            created_at,
        })
    }

    /// Rebuilds an organization from persisted fields.
    pub fn from_parts(
        id: TenantId,
        name: String,
        domain: String,
        subscription_tier: SubscriptionTier,
        is_active: bool,
        quotas: OrganizationQuotas,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            domain,
            subscription_tier,
            is_active,
            quotas,
            pending_verification: None,
            domain_verified_at: None,
            created_at,
        })
    }

    /// Restores persisted domain ownership state.
    #[must_use]
    pub fn with_domain_ownership(
        mut self,
        pending_verification: Option<PendingDomainVerification>,
        domain_verified_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.pending_verification = pending_verification;
        self.domain_verified_at = domain_verified_at;
        self
    }

    /// Returns the organization identifier, which is also its tenant id.
    #[must_use]
    pub fn id(&self) -> TenantId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the normalized primary domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.domain.as_str()
    }

    /// Returns the subscription tier.
    #[must_use]
    pub fn subscription_tier(&self) -> SubscriptionTier {
        self.subscription_tier
    }

    /// Returns whether the organization may be used.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns quota settings.
    #[must_use]
    pub fn quotas(&self) -> &OrganizationQuotas {
        &self.quotas
    }

    /// Returns the outstanding ownership challenge, if any.
    #[must_use]
    pub fn pending_verification(&self) -> Option<&PendingDomainVerification> {
        self.pending_verification.as_ref()
    }

    /// Returns when domain ownership was proven.
    #[must_use]
    pub fn domain_verified_at(&self) -> Option<DateTime<Utc>> {
        self.domain_verified_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Soft-disables the organization. Organizations are never deleted.
    pub fn deactivate(&mut self) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::Conflict(format!(
                "organization '{}' is already inactive",
                self.id
            )));
        }

        self.is_active = false;
        Ok(())
    }

    /// Opens a domain ownership challenge, replacing any outstanding one.
    pub fn request_domain_verification(
        &mut self,
        method: VerificationMethod,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<&PendingDomainVerification> {
        if self.domain_verified_at.is_some() {
            return Err(AppError::Conflict(format!(
                "domain '{}' is already verified",
                self.domain
            )));
        }

        Ok(&*self
            .pending_verification
            .insert(PendingDomainVerification::issue(method, raw_token, now)))
    }

    /// Completes the outstanding challenge with the issued token.
    pub fn confirm_domain_verification(
        &mut self,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.domain_verified_at.is_some() {
            return Err(AppError::Conflict(format!(
                "domain '{}' is already verified",
                self.domain
            )));
        }

        let accepted = self
            .pending_verification
            .as_ref()
            .is_some_and(|pending| pending.accepts(raw_token, now));
        if !accepted {
            return Err(AppError::Validation(
                "invalid or expired verification token".to_owned(),
            ));
        }

        self.pending_verification = None;
        self.domain_verified_at = Some(now);
        Ok(())
    }
}

impl TenantScoped for Organization {
    const ENTITY_LABEL: &'static str = "organization";

    fn tenant_id(&self) -> TenantId {
        self.id
    }

    fn row_id(&self) -> Uuid {
        self.id.as_uuid()
    }
}

fn normalize_domain(value: &str) -> AppResult<String> {
    let domain = value.trim().trim_end_matches('.').to_lowercase();

    let valid_labels = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '-')
    });

    if domain.len() > 253 || !domain.contains('.') || !valid_labels {
        return Err(AppError::Validation(format!(
            "'{value}' is not a valid organization domain"
        )));
    }

    Ok(domain)
}
