use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_core::{AppError, AppResult, TenantContext};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditValues, DOMAIN_CHALLENGE_LABEL, Member, MemberRole,
    Organization, ResourceType, VerificationMethod,
};
use tracing::info;

use crate::ports::{MemberRepository, OrganizationRepository, SecurityPolicyRepository};
use crate::{AccessService, AuditRetryPolicy};

/// TTL suggested for the DNS challenge record.
pub const DNS_CHALLENGE_TTL_SECONDS: u32 = 3600;

/// Issued domain ownership challenge. The raw token is shown only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainChallenge {
    /// Challenge method.
    pub method: VerificationMethod,
    /// Domain being verified.
    pub domain: String,
    /// Raw token.
    pub token: String,
    /// Name of the TXT record for DNS challenges.
    pub dns_record_name: Option<String>,
    /// Administrator mailbox for email challenges.
    pub recipient: Option<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// One onboarding step and whether it is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingStep {
    /// Human readable step name.
    pub step: &'static str,
    /// Completion flag.
    pub completed: bool,
}

/// Onboarding progress of the active tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingStatus {
    /// Organization display name.
    pub organization_name: String,
    /// Organization domain.
    pub domain: String,
    /// Steps in completion order.
    pub steps: Vec<OnboardingStep>,
}

impl OnboardingStatus {
    /// Returns the completed share of steps, rounded down.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let total = self.steps.len();
        if total == 0 {
            return 100;
        }
        let completed = self.steps.iter().filter(|step| step.completed).count();
        u8::try_from(completed * 100 / total).unwrap_or(100)
    }

    /// Returns whether every step is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|step| step.completed)
    }

    /// Returns the first outstanding step.
    #[must_use]
    pub fn next_step(&self) -> Option<&'static str> {
        self.steps
            .iter()
            .find(|step| !step.completed)
            .map(|step| step.step)
    }
}

/// Application service for domain ownership and onboarding progress.
#[derive(Clone)]
pub struct DomainVerificationService {
    organizations: Arc<dyn OrganizationRepository>,
    members: Arc<dyn MemberRepository>,
    policies: Arc<dyn SecurityPolicyRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl DomainVerificationService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        members: Arc<dyn MemberRepository>,
        policies: Arc<dyn SecurityPolicyRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            organizations,
            members,
            policies,
            access,
            retry,
        }
    }

    /// Issues a new ownership token, replacing any outstanding one.
    ///
    /// Email challenges need an active administrator to receive the token.
    pub async fn request(
        &self,
        context: &TenantContext,
        method: VerificationMethod,
    ) -> AppResult<DomainChallenge> {
        self.access.require_admin(context).await?;

        let recipient = match method {
            VerificationMethod::Dns => None,
            VerificationMethod::Email => Some(
                self.active_admin(context)
                    .await?
                    .ok_or_else(|| {
                        AppError::Validation(
                            "no active administrator can receive the verification email"
                                .to_owned(),
                        )
                    })?
                    .email()
                    .to_owned(),
            ),
        };

        let token = generate_token()?;
        let mut organization = self.organizations.find_organization(context).await?;
        let expires_at = organization
            .request_domain_verification(method, token.as_str(), Utc::now())?
            .expires_at;

        let draft = AuditDraft::new(
            AuditActionType::DomainVerificationRequested,
            ResourceType::Organization,
            Some(organization.id().to_string()),
            None,
            Some(
                AuditValues::new()
                    .with("domain", organization.domain())
                    .with("verification_method", method.as_str())
                    .with("verification_expires_at", expires_at.to_rfc3339()),
            ),
        )?;

        self.retry
            .run(context, "domain_verification_request", || {
                self.organizations
                    .save_organization(context, &organization, draft.clone())
            })
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            method = method.as_str(),
            "domain verification requested"
        );

        Ok(DomainChallenge {
            method,
            dns_record_name: (method == VerificationMethod::Dns)
                .then(|| format!("{DOMAIN_CHALLENGE_LABEL}.{}", organization.domain())),
            domain: organization.domain().to_owned(),
            token,
            recipient,
            expires_at,
        })
    }

    /// Marks the domain verified when `token` answers the outstanding
    /// challenge.
    pub async fn confirm(&self, context: &TenantContext, token: &str) -> AppResult<Organization> {
        self.access.require_admin(context).await?;

        let mut organization = self.organizations.find_organization(context).await?;
        organization.confirm_domain_verification(token, Utc::now())?;
        let verified_at = organization
            .domain_verified_at()
            .map(|verified_at| verified_at.to_rfc3339())
            .unwrap_or_default();

        let draft = AuditDraft::new(
            AuditActionType::DomainVerified,
            ResourceType::Organization,
            Some(organization.id().to_string()),
            None,
            Some(
                AuditValues::new()
                    .with("domain", organization.domain())
                    .with("domain_verified_at", verified_at),
            ),
        )?;

        self.retry
            .run(context, "domain_verification_confirm", || {
                self.organizations
                    .save_organization(context, &organization, draft.clone())
            })
            .await?;

        info!(tenant_id = %context.tenant_id(), domain = organization.domain(), "domain verified");
        Ok(organization)
    }

    /// Reports which onboarding steps the tenant has completed.
    pub async fn onboarding_status(&self, context: &TenantContext) -> AppResult<OnboardingStatus> {
        let organization = self.organizations.find_organization(context).await?;
        let admin_added = self.active_admin(context).await?.is_some();
        let policy_configured = match self.policies.find_security_policy(context).await {
            Ok(_) => true,
            Err(AppError::NotFound(_)) => false,
            Err(error) => return Err(error),
        };

        Ok(OnboardingStatus {
            organization_name: organization.name().to_owned(),
            domain: organization.domain().to_owned(),
            steps: vec![
                OnboardingStep {
                    step: "Organization Created",
                    completed: true,
                },
                OnboardingStep {
                    step: "Admin User Added",
                    completed: admin_added,
                },
                OnboardingStep {
                    step: "Domain Verified",
                    completed: organization.domain_verified_at().is_some(),
                },
                OnboardingStep {
                    step: "Security Policy Configured",
                    completed: policy_configured,
                },
            ],
        })
    }

    async fn active_admin(&self, context: &TenantContext) -> AppResult<Option<Member>> {
        Ok(self
            .members
            .list_members(context)
            .await?
            .into_iter()
            .find(|member| member.is_active && member.role == MemberRole::Admin))
    }
}

fn generate_token() -> AppResult<String> {
    let mut bytes = [0_u8; 32];
    getrandom::fill(&mut bytes).map_err(|error| {
        AppError::Internal(format!("failed to generate verification token: {error}"))
    })?;

    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sentinel_core::AppError;
    use sentinel_domain::{AuditActionType, MemberRole, VerificationMethod};

    use super::DomainVerificationService;
    use crate::test_support::FakeStore;
    use crate::{AccessService, AuditRetryPolicy};

    fn service(store: &Arc<FakeStore>) -> DomainVerificationService {
        DomainVerificationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            AccessService::new(store.clone()),
            AuditRetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn dns_challenge_names_the_txt_record_and_stores_only_a_hash() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Admin).await;

        let challenge = service(&store)
            .request(&context, VerificationMethod::Dns)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            challenge.dns_record_name,
            Some(format!("_sentinelshield.{}", challenge.domain))
        );
        assert_eq!(challenge.token.len(), 64);
        let organizations = store.organizations.lock().await;
        let pending = organizations
            .first()
            .and_then(|organization| organization.pending_verification());
        assert!(pending.is_some_and(|pending| pending.token_hash != challenge.token));

        let chain = store.chain_of(context.tenant_id()).await;
        assert_eq!(
            chain.first().map(|record| record.action_type()),
            Some(AuditActionType::DomainVerificationRequested)
        );
    }

    #[tokio::test]
    async fn confirmation_verifies_the_domain_and_completes_onboarding() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Admin).await;
        let service = service(&store);

        let before = service
            .onboarding_status(&context)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(before.progress_percent(), 75);
        assert_eq!(before.next_step(), Some("Domain Verified"));

        let challenge = service
            .request(&context, VerificationMethod::Email)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(challenge.recipient.as_deref(), Some("owner@acme.test"));
        assert!(challenge.dns_record_name.is_none());

        let wrong = service.confirm(&context, "not-the-token").await;
        assert!(matches!(wrong, Err(AppError::Validation(_))));

        let verified = service.confirm(&context, challenge.token.as_str()).await;
        assert!(verified.is_ok_and(|organization| organization.domain_verified_at().is_some()));

        let after = service
            .onboarding_status(&context)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(after.is_complete());
        assert_eq!(after.progress_percent(), 100);
        assert_eq!(after.next_step(), None);

        let actions: Vec<AuditActionType> = store
            .chain_of(context.tenant_id())
            .await
            .iter()
            .map(|record| record.action_type())
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditActionType::DomainVerificationRequested,
                AuditActionType::DomainVerified
            ]
        );
    }

    #[tokio::test]
    async fn analysts_cannot_request_a_challenge() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;

        let result = service(&store)
            .request(&context, VerificationMethod::Dns)
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(store.chain_of(context.tenant_id()).await.is_empty());
    }

    #[tokio::test]
    async fn onboarding_without_an_admin_points_at_the_missing_step() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Viewer).await;

        let status = service(&store)
            .onboarding_status(&context)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(status.progress_percent(), 50);
        assert_eq!(status.next_step(), Some("Admin User Added"));
        assert!(!status.is_complete());
    }
}
