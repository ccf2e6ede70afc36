use std::net::IpAddr;

use async_trait::async_trait;
use sentinel_core::{AppResult, TenantId};
use uuid::Uuid;

/// Identity claims forwarded by the trusted upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAssertion {
    /// Asserted tenant.
    pub tenant_id: TenantId,
    /// Asserted member inside that tenant.
    pub member_id: Uuid,
    /// Caller address, when known.
    pub ip_address: Option<IpAddr>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

/// Membership facts needed to accept an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantMembership {
    /// Whether the organization is active.
    pub organization_active: bool,
    /// Whether the member is active.
    pub member_active: bool,
}

/// Registry of organizations and their members used before a tenant
/// context exists.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Finds the membership of `member_id` inside `tenant_id`.
    ///
    /// Returns `None` when the organization or member is missing, or when
    /// the member belongs to another organization.
    async fn find_membership(
        &self,
        tenant_id: TenantId,
        member_id: Uuid,
    ) -> AppResult<Option<TenantMembership>>;

    /// Lists every active organization id.
    async fn list_active_tenant_ids(&self) -> AppResult<Vec<TenantId>>;
}
