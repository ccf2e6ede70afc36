use sentinel_application::SessionRevocation;
use sentinel_domain::Member;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{AuditRecordResponse, format_timestamp};

/// API representation of an organization member.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/member-response.ts"
)]
pub struct MemberResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub sessions_revoked_at: Option<String>,
    pub created_at: String,
}

impl From<Member> for MemberResponse {
    fn from(value: Member) -> Self {
        Self {
            id: value.id().to_string(),
            email: value.email().to_owned(),
            full_name: value.full_name().to_owned(),
            role: value.role.as_str().to_owned(),
            is_active: value.is_active,
            sessions_revoked_at: value.sessions_revoked_at.map(format_timestamp),
            created_at: format_timestamp(value.created_at()),
        }
    }
}

/// Incoming payload for member invitations.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/invite-member-request.ts"
)]
pub struct InviteMemberRequest {
    pub email: String,
    pub full_name: String,
    pub role: String,
}

/// Incoming payload for session revocation.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/revoke-sessions-request.ts"
)]
pub struct RevokeSessionsRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of revoking a member's sessions.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/session-revocation-response.ts"
)]
pub struct SessionRevocationResponse {
    pub member: MemberResponse,
    pub revoked_api_keys: u32,
    pub audit_record: AuditRecordResponse,
}

impl From<SessionRevocation> for SessionRevocationResponse {
    fn from(value: SessionRevocation) -> Self {
        Self {
            member: value.member.into(),
            revoked_api_keys: u32::try_from(value.revoked_api_keys).unwrap_or(u32::MAX),
            audit_record: value.audit_record.into(),
        }
    }
}
