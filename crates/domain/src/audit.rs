//! Hash-chained, append-only audit records.
//!
//! Each tenant owns one chain. A record's `content_hash` covers all of its
//! persisted fields including `previous_hash`, which is the `content_hash`
//! of the record before it, or [`GENESIS_HASH`] for the first record.

mod canonical;
mod values;
mod verification;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sentinel_core::{ActorContext, AppError, AppResult, TenantContext, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canonical::CanonicalEncoder;

pub use values::{AuditValue, AuditValues};
pub use verification::{ChainVerifier, Divergence, DivergenceReason, VerificationResult};

/// Link target of the first record of every tenant chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActionType {
    /// An organization was onboarded.
    OrganizationCreated,
    /// An organization was soft-disabled.
    OrganizationDeactivated,
    /// A domain ownership token was issued.
    DomainVerificationRequested,
    /// Domain ownership was proven.
    DomainVerified,
    /// A member was invited.
    MemberInvited,
    /// All sessions of a member were revoked.
    SessionRevoked,
    /// A threat was flagged as false positive.
    FalsePositiveFlagged,
    /// The security policy changed.
    SecurityPolicyUpdated,
    /// An API key was issued.
    ApiKeyCreated,
    /// An API key was revoked.
    ApiKeyRevoked,
    /// Records past retention were moved to the archive.
    AuditRecordsArchived,
}

impl AuditActionType {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationCreated => "organization_created",
            Self::OrganizationDeactivated => "organization_deactivated",
            Self::DomainVerificationRequested => "domain_verification_requested",
            Self::DomainVerified => "domain_verified",
            Self::MemberInvited => "user_invited",
            Self::SessionRevoked => "session_revoked",
            Self::FalsePositiveFlagged => "false_positive_flagged",
            Self::SecurityPolicyUpdated => "security_policy_updated",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyRevoked => "api_key_revoked",
            Self::AuditRecordsArchived => "audit_records_archived",
        }
    }
}

impl FromStr for AuditActionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "organization_created" => Ok(Self::OrganizationCreated),
            "organization_deactivated" => Ok(Self::OrganizationDeactivated),
            "domain_verification_requested" => Ok(Self::DomainVerificationRequested),
            "domain_verified" => Ok(Self::DomainVerified),
            "user_invited" => Ok(Self::MemberInvited),
            "session_revoked" => Ok(Self::SessionRevoked),
            "false_positive_flagged" => Ok(Self::FalsePositiveFlagged),
            "security_policy_updated" => Ok(Self::SecurityPolicyUpdated),
            "api_key_created" => Ok(Self::ApiKeyCreated),
            "api_key_revoked" => Ok(Self::ApiKeyRevoked),
            "audit_records_archived" => Ok(Self::AuditRecordsArchived),
            _ => Err(AppError::Validation(format!(
                "unknown audit action type '{value}'"
            ))),
        }
    }
}

/// Kind of resource an audit record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// An organization.
    Organization,
    /// A member account.
    Member,
    /// A threat log.
    ThreatLog,
    /// The security policy.
    SecurityPolicy,
    /// An API key.
    ApiKey,
    /// The audit trail itself.
    AuditTrail,
}

impl ResourceType {
    /// Returns a stable storage value for this resource type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Member => "user",
            Self::ThreatLog => "threat_log",
            Self::SecurityPolicy => "security_policy",
            Self::ApiKey => "api_key",
            Self::AuditTrail => "audit_trail",
        }
    }

    /// Returns the keys an audit payload may carry for this resource type.
    #[must_use]
    pub fn value_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Organization => &[
                "name",
                "domain",
                "subscription_tier",
                "is_active",
                "verification_method",
                "verification_expires_at",
                "domain_verified_at",
            ],
            Self::Member => &[
                "email",
                "full_name",
                "role",
                "is_active",
                "sessions_revoked_at",
                "revoked_api_keys",
                "reason",
                "revoked_by",
            ],
            Self::ThreatLog => &["false_positive", "is_blocked", "severity", "reason"],
            Self::SecurityPolicy => &[
                "alert_threshold_bps",
                "block_threshold_bps",
                "velocity_threshold",
                "anomaly_sensitivity",
                "enable_auto_block",
                "enable_geo_blocking",
                "blocked_countries",
                "enable_ip_reputation_check",
                "suspicious_activity_alert_email",
            ],
            Self::ApiKey => &["name", "key_prefix", "member_id", "expires_at", "is_active"],
            Self::AuditTrail => &["archived_count", "archived_through_sequence", "cutoff"],
        }
    }
}

impl FromStr for ResourceType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "organization" => Ok(Self::Organization),
            "user" => Ok(Self::Member),
            "threat_log" => Ok(Self::ThreatLog),
            "security_policy" => Ok(Self::SecurityPolicy),
            "api_key" => Ok(Self::ApiKey),
            "audit_trail" => Ok(Self::AuditTrail),
            _ => Err(AppError::Validation(format!(
                "unknown audit resource type '{value}'"
            ))),
        }
    }
}

/// Validated payload of an audit record before it joins the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    action_type: AuditActionType,
    resource_type: ResourceType,
    resource_id: Option<String>,
    old_values: Option<AuditValues>,
    new_values: Option<AuditValues>,
}

impl AuditDraft {
    /// Creates a draft, validating both payloads against the resource schema.
    pub fn new(
        action_type: AuditActionType,
        resource_type: ResourceType,
        resource_id: Option<String>,
        old_values: Option<AuditValues>,
        new_values: Option<AuditValues>,
    ) -> AppResult<Self> {
        if resource_id.as_deref().is_some_and(|value| value.trim().is_empty()) {
            return Err(AppError::Validation(
                "audit resource id must not be blank".to_owned(),
            ));
        }

        for values in [&old_values, &new_values].into_iter().flatten() {
            values.validate_for(resource_type)?;
        }

        Ok(Self {
            action_type,
            resource_type,
            resource_id,
            old_values,
            new_values,
        })
    }

    /// Returns the action type.
    #[must_use]
    pub fn action_type(&self) -> AuditActionType {
        self.action_type
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns the new-value payload.
    #[must_use]
    pub fn new_values(&self) -> Option<&AuditValues> {
        self.new_values.as_ref()
    }

    /// Adds a new-value entry only known inside the writing transaction.
    pub fn with_new_value(mut self, key: &str, value: impl Into<AuditValue>) -> AppResult<Self> {
        let values = self.new_values.take().unwrap_or_default().with(key, value);
        values.validate_for(self.resource_type)?;
        self.new_values = Some(values);
        Ok(self)
    }
}

/// Head of a tenant chain: what the next record must link to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    /// Sequence of the last record, `0` for an empty chain.
    pub sequence: u64,
    /// Content hash of the last record, or the genesis sentinel.
    pub content_hash: String,
    /// Timestamp of the last record.
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ChainTail {
    /// Returns the tail of an empty chain.
    #[must_use]
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            content_hash: GENESIS_HASH.to_owned(),
            recorded_at: None,
        }
    }

    /// Returns the tail positioned on the given record.
    #[must_use]
    pub fn of(record: &AuditRecord) -> Self {
        Self {
            sequence: record.sequence,
            content_hash: record.content_hash.clone(),
            recorded_at: Some(record.recorded_at),
        }
    }
}

/// One immutable fact about a change inside a tenant.
///
/// Fields are private and have no setters: a record can only be produced by
/// sealing a draft against a chain tail, or rebuilt from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    id: Uuid,
    tenant_id: TenantId,
    sequence: u64,
    action_type: AuditActionType,
    resource_type: ResourceType,
    resource_id: Option<String>,
    old_values: Option<AuditValues>,
    new_values: Option<AuditValues>,
    actor: ActorContext,
    recorded_at: DateTime<Utc>,
    content_hash: String,
    previous_hash: String,
}

impl AuditRecord {
    /// Seals a draft as the record following `tail` in the context's chain.
    ///
    /// The timestamp is truncated to microseconds and never earlier than the
    /// tail's timestamp, so creation order and timestamp order agree.
    #[must_use]
    pub fn seal(
        context: &TenantContext,
        draft: AuditDraft,
        tail: &ChainTail,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(6);
        let recorded_at = tail.recorded_at.map_or(now, |previous| previous.max(now));

        let mut record = Self {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id(),
            sequence: tail.sequence + 1,
            action_type: draft.action_type,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            old_values: draft.old_values,
            new_values: draft.new_values,
            actor: context.actor().clone(),
            recorded_at,
            content_hash: String::new(),
            previous_hash: tail.content_hash.clone(),
        };
        record.content_hash = record.compute_content_hash();
        record
    }

    /// Rebuilds a record from stored fields without recomputing its hash.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        tenant_id: TenantId,
        sequence: u64,
        action_type: AuditActionType,
        resource_type: ResourceType,
        resource_id: Option<String>,
        old_values: Option<AuditValues>,
        new_values: Option<AuditValues>,
        actor: ActorContext,
        recorded_at: DateTime<Utc>,
        content_hash: String,
        previous_hash: String,
    ) -> Self {
        Self {
            id,
            tenant_id,
            sequence,
            action_type,
            resource_type,
            resource_id,
            old_values,
            new_values,
            actor,
            recorded_at,
            content_hash,
            previous_hash,
        }
    }

    /// Recomputes the content hash from the record's fields.
    #[must_use]
    pub fn compute_content_hash(&self) -> String {
        let recorded_at = self
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let tenant_id = self.tenant_id.to_string();
        let member_id = self.actor.member_id().map(|value| value.to_string());
        let ip_address = self.actor.ip_address().map(|value| value.to_string());

        let mut encoder = CanonicalEncoder::new();
        encoder
            .text("tenant_id", Some(tenant_id.as_str()))
            .integer("sequence", self.sequence)
            .text("action_type", Some(self.action_type.as_str()))
            .text("resource_type", Some(self.resource_type.as_str()))
            .text("resource_id", self.resource_id.as_deref())
            .values("old_values", self.old_values.as_ref())
            .values("new_values", self.new_values.as_ref())
            .text("actor_subject", Some(self.actor.subject()))
            .text("actor_member_id", member_id.as_deref())
            .text("actor_ip_address", ip_address.as_deref())
            .text("actor_user_agent", self.actor.user_agent())
            .text("recorded_at", Some(recorded_at.as_str()))
            .text("previous_hash", Some(self.previous_hash.as_str()));
        encoder.finish()
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the 1-based position in the tenant chain.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the action type.
    #[must_use]
    pub fn action_type(&self) -> AuditActionType {
        self.action_type
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns the values before the change.
    #[must_use]
    pub fn old_values(&self) -> Option<&AuditValues> {
        self.old_values.as_ref()
    }

    /// Returns the values after the change.
    #[must_use]
    pub fn new_values(&self) -> Option<&AuditValues> {
        self.new_values.as_ref()
    }

    /// Returns who performed the change.
    #[must_use]
    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    /// Returns the commit timestamp.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Returns the stored content hash.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        self.content_hash.as_str()
    }

    /// Returns the stored link to the previous record.
    #[must_use]
    pub fn previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }
}
