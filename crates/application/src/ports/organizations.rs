use async_trait::async_trait;
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{AuditDraft, AuditRecord, Member, Organization, SecurityPolicy};

/// Rows created together when an organization is onboarded.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationOnboarding {
    /// New organization.
    pub organization: Organization,
    /// First administrator.
    pub admin: Member,
    /// Default security policy.
    pub policy: SecurityPolicy,
}

/// Repository port for organizations.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Persists an onboarding and its audit record in one transaction.
    async fn create_organization(
        &self,
        context: &TenantContext,
        onboarding: OrganizationOnboarding,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;

    /// Returns the organization of the active tenant.
    async fn find_organization(&self, context: &TenantContext) -> AppResult<Organization>;

    /// Persists organization changes and their audit record in one
    /// transaction.
    async fn save_organization(
        &self,
        context: &TenantContext,
        organization: &Organization,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;
}
