use std::sync::Arc;

use sentinel_core::{ActorContext, AppError, AppResult, TenantContext, TenantId};
use tracing::debug;

use crate::ports::{GatewayAssertion, TenantDirectory};

/// Establishes the active tenant for one unit of work.
///
/// Resolution fails closed: a missing, inactive or mismatched organization
/// or member yields `AppError::TenantContextMissing`.
#[derive(Clone)]
pub struct TenantContextService {
    directory: Arc<dyn TenantDirectory>,
}

impl TenantContextService {
    /// Creates a resolver from a tenant directory.
    #[must_use]
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves a gateway assertion into a tenant context.
    pub async fn resolve(&self, assertion: GatewayAssertion) -> AppResult<TenantContext> {
        let membership = self
            .directory
            .find_membership(assertion.tenant_id, assertion.member_id)
            .await?;

        match membership {
            Some(membership) if membership.organization_active && membership.member_active => {
                Ok(TenantContext::new(
                    assertion.tenant_id,
                    ActorContext::member(
                        assertion.member_id,
                        assertion.ip_address,
                        assertion.user_agent,
                    ),
                ))
            }
            Some(_) => {
                debug!(tenant_id = %assertion.tenant_id, "rejected inactive tenant membership");
                Err(AppError::TenantContextMissing(
                    "organization or member is inactive".to_owned(),
                ))
            }
            None => Err(AppError::TenantContextMissing(
                "asserted member does not belong to the asserted tenant".to_owned(),
            )),
        }
    }

    /// Lists active tenants for background sweeps.
    pub async fn active_tenants(&self) -> AppResult<Vec<TenantId>> {
        self.directory.list_active_tenant_ids().await
    }
}
