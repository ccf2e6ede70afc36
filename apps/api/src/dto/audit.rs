use std::str::FromStr;

use sentinel_application::ArchiveOutcome;
use sentinel_application::ports::AuditRecordQuery;
use sentinel_core::AppError;
use sentinel_domain::{AuditActionType, AuditRecord, AuditValues, ResourceType, VerificationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::{format_timestamp, parse_timestamp};

/// API representation of one audit record.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-record-response.ts"
)]
pub struct AuditRecordResponse {
    pub id: String,
    #[ts(type = "number")]
    pub sequence: u64,
    pub action_type: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub old_values: Option<Value>,
    #[ts(type = "Record<string, unknown> | null")]
    pub new_values: Option<Value>,
    pub actor_subject: String,
    pub actor_member_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub recorded_at: String,
    pub content_hash: String,
    pub previous_hash: String,
}

impl From<AuditRecord> for AuditRecordResponse {
    fn from(value: AuditRecord) -> Self {
        let actor = value.actor();
        Self {
            id: value.id().to_string(),
            sequence: value.sequence(),
            action_type: value.action_type().as_str().to_owned(),
            resource_type: value.resource_type().as_str().to_owned(),
            resource_id: value.resource_id().map(str::to_owned),
            old_values: value.old_values().and_then(values_json),
            new_values: value.new_values().and_then(values_json),
            actor_subject: actor.subject().to_owned(),
            actor_member_id: actor.member_id().map(|member_id| member_id.to_string()),
            ip_address: actor.ip_address().map(|ip| ip.to_string()),
            user_agent: actor.user_agent().map(str::to_owned),
            recorded_at: format_timestamp(value.recorded_at()),
            content_hash: value.content_hash().to_owned(),
            previous_hash: value.previous_hash().to_owned(),
        }
    }
}

fn values_json(values: &AuditValues) -> Option<Value> {
    serde_json::to_value(values).ok()
}

/// Query parameters for audit record listing.
#[derive(Debug, Default, Deserialize)]
pub struct AuditRecordListParams {
    pub action_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub actor_subject: Option<String>,
    pub recorded_after: Option<String>,
    pub recorded_before: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditRecordListParams {
    pub fn into_query(self) -> Result<AuditRecordQuery, AppError> {
        let defaults = AuditRecordQuery::default();
        Ok(AuditRecordQuery {
            action_type: self
                .action_type
                .as_deref()
                .map(AuditActionType::from_str)
                .transpose()?,
            resource_type: self
                .resource_type
                .as_deref()
                .map(ResourceType::from_str)
                .transpose()?,
            resource_id: self.resource_id,
            actor_subject: self.actor_subject,
            recorded_after: self
                .recorded_after
                .as_deref()
                .map(|value| parse_timestamp("recorded_after", value))
                .transpose()?,
            recorded_before: self
                .recorded_before
                .as_deref()
                .map(|value| parse_timestamp("recorded_before", value))
                .transpose()?,
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

/// First record at which a chain diverged.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/divergence-response.ts"
)]
pub struct DivergenceResponse {
    pub record_id: String,
    #[ts(type = "number")]
    pub sequence: u64,
    pub reason: String,
}

/// Outcome of a chain verification.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/verification-response.ts"
)]
pub struct VerificationResponse {
    pub status: String,
    #[ts(type = "number | null")]
    pub records_checked: Option<u64>,
    #[ts(type = "number | null")]
    pub tail_sequence: Option<u64>,
    pub tail_hash: Option<String>,
    pub divergence: Option<DivergenceResponse>,
}

impl From<VerificationResult> for VerificationResponse {
    fn from(value: VerificationResult) -> Self {
        match value {
            VerificationResult::Verified {
                records_checked,
                tail_sequence,
                tail_hash,
            } => Self {
                status: "verified".to_owned(),
                records_checked: Some(records_checked),
                tail_sequence: Some(tail_sequence),
                tail_hash: Some(tail_hash),
                divergence: None,
            },
            VerificationResult::Diverged(divergence) => Self {
                status: "diverged".to_owned(),
                records_checked: None,
                tail_sequence: None,
                tail_hash: None,
                divergence: Some(DivergenceResponse {
                    record_id: divergence.record_id.to_string(),
                    sequence: divergence.sequence,
                    reason: divergence.reason.as_str().to_owned(),
                }),
            },
        }
    }
}

/// Result of a retention archival run.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/archive-outcome-response.ts"
)]
pub struct ArchiveOutcomeResponse {
    pub cutoff: String,
    #[ts(type = "number")]
    pub archived_count: u64,
    #[ts(type = "number | null")]
    pub archived_through_sequence: Option<u64>,
    pub audit_record: Option<AuditRecordResponse>,
}

impl From<ArchiveOutcome> for ArchiveOutcomeResponse {
    fn from(value: ArchiveOutcome) -> Self {
        Self {
            cutoff: format_timestamp(value.cutoff),
            archived_count: value.archived_count,
            archived_through_sequence: value.archived_through_sequence,
            audit_record: value.audit_record.map(AuditRecordResponse::from),
        }
    }
}
