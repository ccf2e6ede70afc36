use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditRecord, AuditValues, Member, MemberRole, ResourceType,
};
use tracing::info;
use uuid::Uuid;

use crate::ports::{MemberRepository, OrganizationRepository};
use crate::{AccessService, AuditRetryPolicy};

/// Input for inviting a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteMemberInput {
    /// Member email.
    pub email: String,
    /// Member full name.
    pub full_name: String,
    /// Granted role.
    pub role: MemberRole,
}

/// Result of a session revocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRevocation {
    /// Member with the new revocation stamp.
    pub member: Member,
    /// Number of API keys deactivated with the sessions.
    pub revoked_api_keys: u64,
    /// Audit record documenting the revocation.
    pub audit_record: AuditRecord,
}

/// Application service for organization members.
#[derive(Clone)]
pub struct MemberService {
    repository: Arc<dyn MemberRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl MemberService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MemberRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            organizations,
            access,
            retry,
        }
    }

    /// Lists members of the active tenant.
    pub async fn list(&self, context: &TenantContext) -> AppResult<Vec<Member>> {
        self.repository.list_members(context).await
    }

    /// Invites a member into the active tenant.
    pub async fn invite(&self, context: &TenantContext, input: InviteMemberInput) -> AppResult<Member> {
        self.access.require_admin(context).await?;

        // Early rejection only; create_member re-checks under its write lock.
        let organization = self.organizations.find_organization(context).await?;
        let existing = self.repository.list_members(context).await?;
        organization
            .quotas()
            .admit_member(existing.len() as u64)?;

        let member = Member::new(
            context.tenant_id(),
            input.email.as_str(),
            input.full_name.as_str(),
            input.role,
            Utc::now(),
        )?;
        let draft = AuditDraft::new(
            AuditActionType::MemberInvited,
            ResourceType::Member,
            Some(member.id().to_string()),
            None,
            Some(
                AuditValues::new()
                    .with("email", member.email())
                    .with("full_name", member.full_name())
                    .with("role", member.role.as_str())
                    .with("is_active", member.is_active),
            ),
        )?;

        self.retry
            .run(context, "member_invite", || {
                self.repository
                    .create_member(context, &member, draft.clone())
            })
            .await?;

        Ok(member)
    }

    /// Revokes every session of a member and deactivates the member's API
    /// keys.
    pub async fn revoke_sessions(
        &self,
        context: &TenantContext,
        member_id: Uuid,
        reason: Option<String>,
    ) -> AppResult<SessionRevocation> {
        self.access.require_admin(context).await?;

        let mut member = self.repository.find_member(context, member_id).await?;

        let previous_stamp = member
            .sessions_revoked_at
            .map(|stamp| stamp.to_rfc3339_opts(SecondsFormat::Micros, true));
        let revoked_at = Utc::now();
        member.sessions_revoked_at = Some(revoked_at);

        let reason = reason
            .map(|reason| reason.trim().to_owned())
            .filter(|reason| !reason.is_empty());
        let draft = AuditDraft::new(
            AuditActionType::SessionRevoked,
            ResourceType::Member,
            Some(member_id.to_string()),
            Some(AuditValues::new().with("sessions_revoked_at", previous_stamp)),
            Some(
                AuditValues::new()
                    .with(
                        "sessions_revoked_at",
                        revoked_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                    )
                    .with("reason", reason)
                    .with("revoked_by", context.actor().subject()),
            ),
        )?;

        let revoked = self
            .retry
            .run(context, "member_revoke_sessions", || {
                self.repository
                    .revoke_member_sessions(context, &member, draft.clone())
            })
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            member_id = %member_id,
            revoked_api_keys = revoked.revoked_api_keys,
            "member sessions revoked"
        );

        Ok(SessionRevocation {
            member,
            revoked_api_keys: revoked.revoked_api_keys,
            audit_record: revoked.audit_record,
        })
    }
}
