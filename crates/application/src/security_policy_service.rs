use std::sync::Arc;

use chrono::Utc;
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditValues, ResourceType, SecurityPolicy,
    SecurityPolicySettings,
};

use crate::ports::SecurityPolicyRepository;
use crate::{AccessService, AuditRetryPolicy};

/// Application service for the tenant security policy.
#[derive(Clone)]
pub struct SecurityPolicyService {
    repository: Arc<dyn SecurityPolicyRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl SecurityPolicyService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn SecurityPolicyRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            access,
            retry,
        }
    }

    /// Returns the active tenant's policy.
    pub async fn get(&self, context: &TenantContext) -> AppResult<SecurityPolicy> {
        self.repository.find_security_policy(context).await
    }

    /// Replaces the policy settings, auditing changed keys only.
    ///
    /// Submitting identical settings writes nothing.
    pub async fn update(
        &self,
        context: &TenantContext,
        settings: SecurityPolicySettings,
    ) -> AppResult<SecurityPolicy> {
        self.access.require_admin(context).await?;

        let settings = settings.normalized()?;
        let mut policy = self.repository.find_security_policy(context).await?;
        if policy.settings == settings {
            return Ok(policy);
        }

        let before = settings_values(&policy.settings);
        let after = settings_values(&settings);
        let (old_values, new_values) = changed_values(&before, &after);

        policy.settings = settings;
        policy.updated_at = Utc::now();

        let draft = AuditDraft::new(
            AuditActionType::SecurityPolicyUpdated,
            ResourceType::SecurityPolicy,
            Some(policy.id().to_string()),
            Some(old_values),
            Some(new_values),
        )?;

        self.retry
            .run(context, "security_policy_update", || {
                self.repository
                    .save_security_policy(context, &policy, draft.clone())
            })
            .await?;

        Ok(policy)
    }
}

fn settings_values(settings: &SecurityPolicySettings) -> AuditValues {
    AuditValues::new()
        .with("alert_threshold_bps", settings.alert_threshold_bps)
        .with("block_threshold_bps", settings.block_threshold_bps)
        .with("velocity_threshold", settings.velocity_threshold)
        .with(
            "anomaly_sensitivity",
            settings.anomaly_sensitivity.as_str(),
        )
        .with("enable_auto_block", settings.enable_auto_block)
        .with("enable_geo_blocking", settings.enable_geo_blocking)
        .with("blocked_countries", settings.blocked_countries.clone())
        .with(
            "enable_ip_reputation_check",
            settings.enable_ip_reputation_check,
        )
        .with(
            "suspicious_activity_alert_email",
            settings.suspicious_activity_alert_email,
        )
}

fn changed_values(before: &AuditValues, after: &AuditValues) -> (AuditValues, AuditValues) {
    after.iter().fold(
        (AuditValues::new(), AuditValues::new()),
        |(old_values, new_values), (key, value)| match before.get(key) {
            Some(previous) if previous == value => (old_values, new_values),
            previous => (
                old_values.with(key, previous.cloned()),
                new_values.with(key, value.clone()),
            ),
        },
    )
}
