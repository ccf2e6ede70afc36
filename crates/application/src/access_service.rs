use std::sync::Arc;

use sentinel_core::{AppError, AppResult, TenantContext};
use sentinel_domain::{Member, MemberRole};

use crate::ports::MemberRepository;

/// Role checks for the member behind a tenant context.
///
/// Contexts without a member are trusted background actors and pass every
/// check.
#[derive(Clone)]
pub struct AccessService {
    members: Arc<dyn MemberRepository>,
}

impl AccessService {
    /// Creates an access service from a member repository.
    #[must_use]
    pub fn new(members: Arc<dyn MemberRepository>) -> Self {
        Self { members }
    }

    /// Requires an active administrator.
    pub async fn require_admin(&self, context: &TenantContext) -> AppResult<()> {
        self.require(context, "administrator", MemberRole::is_admin)
            .await
    }

    /// Requires an active administrator or analyst.
    pub async fn require_triage(&self, context: &TenantContext) -> AppResult<()> {
        self.require(context, "analyst", MemberRole::can_triage)
            .await
    }

    async fn require(
        &self,
        context: &TenantContext,
        required: &str,
        allowed: fn(&MemberRole) -> bool,
    ) -> AppResult<()> {
        let Some(member_id) = context.member_id() else {
            return Ok(());
        };

        let member: Member = self
            .members
            .find_member(context, member_id)
            .await
            .map_err(|error| match error {
                AppError::NotFound(_) => {
                    AppError::Forbidden(format!("member '{member_id}' is not part of this tenant"))
                }
                other => other,
            })?;

        if !member.is_active || !allowed(&member.role) {
            return Err(AppError::Forbidden(format!(
                "member '{member_id}' requires the {required} role"
            )));
        }

        Ok(())
    }
}
