use async_trait::async_trait;
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{AuditDraft, AuditRecord, Member};
use uuid::Uuid;

/// Result of persisting a session revocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RevokedSessions {
    /// Active API keys of the member deactivated by the write.
    pub revoked_api_keys: u64,
    /// Audit record carrying the same count.
    pub audit_record: AuditRecord,
}

/// Repository port for organization members.
#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// Lists members of the active tenant ordered by email.
    async fn list_members(&self, context: &TenantContext) -> AppResult<Vec<Member>>;

    /// Returns one member of the active tenant.
    async fn find_member(&self, context: &TenantContext, member_id: Uuid) -> AppResult<Member>;

    /// Persists a new member and its audit record in one transaction.
    ///
    /// Duplicate emails inside a tenant and a reached seat limit are
    /// reported as conflicts. The seat count is taken under the same lock
    /// or transaction as the insert.
    async fn create_member(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;

    /// Stores the member's revocation stamp, deactivates every active API
    /// key owned by the member and appends the audit record in one
    /// transaction.
    ///
    /// The number of deactivated keys is added to the draft's new values
    /// as `revoked_api_keys` before it is sealed.
    async fn revoke_member_sessions(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<RevokedSessions>;
}
