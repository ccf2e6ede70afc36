use async_trait::async_trait;
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{AuditDraft, AuditRecord, SecurityPolicy};

/// Repository port for the per-tenant security policy.
#[async_trait]
pub trait SecurityPolicyRepository: Send + Sync {
    /// Returns the policy of the active tenant.
    async fn find_security_policy(&self, context: &TenantContext) -> AppResult<SecurityPolicy>;

    /// Persists the policy and its audit record in one transaction.
    async fn save_security_policy(
        &self,
        context: &TenantContext,
        policy: &SecurityPolicy,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;
}
