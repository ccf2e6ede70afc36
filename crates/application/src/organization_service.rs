use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use sentinel_core::{ActorContext, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditRecord, AuditValues, Member, MemberRole, Organization,
    ResourceType, SecurityPolicy, SubscriptionTier,
};
use tracing::info;

use crate::ports::{OrganizationOnboarding, OrganizationRepository};
use crate::{AccessService, AuditRetryPolicy};

/// Input for onboarding a new organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardOrganizationInput {
    /// Display name.
    pub name: String,
    /// Unique domain.
    pub domain: String,
    /// Subscription tier.
    pub subscription_tier: SubscriptionTier,
    /// Email of the first administrator.
    pub admin_email: String,
    /// Full name of the first administrator.
    pub admin_full_name: String,
    /// Caller address, when known.
    pub ip_address: Option<IpAddr>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

/// Result of a successful onboarding.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardedOrganization {
    /// Created organization.
    pub organization: Organization,
    /// Created administrator.
    pub admin: Member,
    /// First record of the organization's audit chain.
    pub audit_record: AuditRecord,
}

/// Application service for organization lifecycle.
#[derive(Clone)]
pub struct OrganizationService {
    repository: Arc<dyn OrganizationRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl OrganizationService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn OrganizationRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            access,
            retry,
        }
    }

    /// Creates an organization, its administrator and default policy, and
    /// opens its audit chain, all in one transaction.
    pub async fn onboard(&self, input: OnboardOrganizationInput) -> AppResult<OnboardedOrganization> {
        let now = Utc::now();
        let tenant_id = TenantId::new();
        let organization = Organization::new(
            tenant_id,
            input.name,
            input.domain,
            input.subscription_tier,
            now,
        )?;
        let admin = Member::new(
            tenant_id,
            input.admin_email.as_str(),
            input.admin_full_name.as_str(),
            MemberRole::Admin,
            now,
        )?;
        let onboarding = OrganizationOnboarding {
            organization: organization.clone(),
            admin: admin.clone(),
            policy: SecurityPolicy::default_for(tenant_id, now),
        };

        let context = TenantContext::new(
            tenant_id,
            ActorContext::member(admin.id(), input.ip_address, input.user_agent),
        );
        let draft = AuditDraft::new(
            AuditActionType::OrganizationCreated,
            ResourceType::Organization,
            Some(tenant_id.to_string()),
            None,
            Some(organization_values(&organization)),
        )?;

        let audit_record = self
            .retry
            .run(&context, "organization_onboard", || {
                self.repository
                    .create_organization(&context, onboarding.clone(), draft.clone())
            })
            .await?;

        info!(tenant_id = %tenant_id, domain = organization.domain(), "organization onboarded");

        Ok(OnboardedOrganization {
            organization,
            admin,
            audit_record,
        })
    }

    /// Returns the active tenant's organization.
    pub async fn current(&self, context: &TenantContext) -> AppResult<Organization> {
        self.repository.find_organization(context).await
    }

    /// Soft-disables the active tenant's organization.
    ///
    /// The organization and its audit chain are kept. Subsequent context
    /// resolution for the tenant fails.
    pub async fn deactivate(&self, context: &TenantContext) -> AppResult<Organization> {
        self.access.require_admin(context).await?;

        let mut organization = self.repository.find_organization(context).await?;
        let old_values = organization_values(&organization);
        organization.deactivate()?;

        let draft = AuditDraft::new(
            AuditActionType::OrganizationDeactivated,
            ResourceType::Organization,
            Some(organization.id().to_string()),
            Some(old_values),
            Some(organization_values(&organization)),
        )?;

        self.retry
            .run(context, "organization_deactivate", || {
                self.repository
                    .save_organization(context, &organization, draft.clone())
            })
            .await?;

        info!(tenant_id = %context.tenant_id(), "organization deactivated");
        Ok(organization)
    }
}

fn organization_values(organization: &Organization) -> AuditValues {
    AuditValues::new()
        .with("name", organization.name())
        .with("domain", organization.domain())
        .with(
            "subscription_tier",
            organization.subscription_tier().as_str(),
        )
        .with("is_active", organization.is_active())
}
