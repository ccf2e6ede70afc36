use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sentinel_core::{AppError, AppResult, TenantContext};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditValues, ResourceType, ThreatLog, ThreatObservation,
    ThreatSeverity,
};
use uuid::Uuid;

use crate::ports::{SeverityCount, ThreatQuery, ThreatRepository};
use crate::{AccessService, AuditRetryPolicy};

/// Largest threat listing page.
pub const MAX_THREAT_PAGE_SIZE: u32 = 500;

/// Longest threat look-back window in days.
pub const MAX_THREAT_WINDOW_DAYS: u32 = 90;

/// Caller-facing threat listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatListQuery {
    /// Optional severity filter.
    pub severity: Option<ThreatSeverity>,
    /// Look-back window in days, `1..=90`.
    pub days: u32,
    /// Maximum rows returned, clamped to `1..=500`.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
}

impl Default for ThreatListQuery {
    fn default() -> Self {
        Self {
            severity: None,
            days: 7,
            limit: 100,
            offset: 0,
        }
    }
}

/// Application service for threat logs.
#[derive(Clone)]
pub struct ThreatService {
    repository: Arc<dyn ThreatRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl ThreatService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ThreatRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            access,
            retry,
        }
    }

    /// Stores one observed threat for the active tenant.
    pub async fn ingest(
        &self,
        context: &TenantContext,
        observation: ThreatObservation,
        severity: Option<ThreatSeverity>,
    ) -> AppResult<ThreatLog> {
        self.access.require_triage(context).await?;
        let threat = ThreatLog::new(context.tenant_id(), observation, severity, Utc::now())?;
        self.repository.insert_threat(context, &threat).await?;
        Ok(threat)
    }

    /// Lists recent threats newest first.
    pub async fn list(
        &self,
        context: &TenantContext,
        query: ThreatListQuery,
    ) -> AppResult<Vec<ThreatLog>> {
        let since = window_start(query.days)?;
        self.repository
            .list_threats(
                context,
                &ThreatQuery {
                    severity: query.severity,
                    since,
                    limit: query.limit.clamp(1, MAX_THREAT_PAGE_SIZE),
                    offset: query.offset,
                },
            )
            .await
    }

    /// Returns one threat.
    pub async fn get(&self, context: &TenantContext, threat_id: Uuid) -> AppResult<ThreatLog> {
        self.repository.find_threat(context, threat_id).await
    }

    /// Counts threats per severity, reporting every severity.
    pub async fn summary(&self, context: &TenantContext, days: u32) -> AppResult<Vec<SeverityCount>> {
        let since = window_start(days)?;
        let counts = self.repository.count_by_severity(context, since).await?;

        Ok(ThreatSeverity::all()
            .iter()
            .map(|severity| SeverityCount {
                severity: *severity,
                count: counts
                    .iter()
                    .filter(|bucket| bucket.severity == *severity)
                    .map(|bucket| bucket.count)
                    .sum(),
            })
            .collect())
    }

    /// Flags a threat as a false positive and unblocks it.
    pub async fn flag_false_positive(
        &self,
        context: &TenantContext,
        threat_id: Uuid,
        reason: Option<String>,
    ) -> AppResult<ThreatLog> {
        self.access.require_triage(context).await?;

        let mut threat = self.repository.find_threat(context, threat_id).await?;
        let old_values = AuditValues::new()
            .with("false_positive", threat.false_positive)
            .with("is_blocked", threat.observation.is_blocked);
        threat.flag_false_positive()?;

        let reason = reason
            .map(|reason| reason.trim().to_owned())
            .filter(|reason| !reason.is_empty());
        let draft = AuditDraft::new(
            AuditActionType::FalsePositiveFlagged,
            ResourceType::ThreatLog,
            Some(threat_id.to_string()),
            Some(old_values),
            Some(
                AuditValues::new()
                    .with("false_positive", threat.false_positive)
                    .with("is_blocked", threat.observation.is_blocked)
                    .with("severity", threat.severity.as_str())
                    .with("reason", reason),
            ),
        )?;

        self.retry
            .run(context, "threat_false_positive", || {
                self.repository.save_threat(context, &threat, draft.clone())
            })
            .await?;

        Ok(threat)
    }
}

fn window_start(days: u32) -> AppResult<DateTime<Utc>> {
    if !(1..=MAX_THREAT_WINDOW_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {MAX_THREAT_WINDOW_DAYS}"
        )));
    }

    Ok(Utc::now() - Duration::days(i64::from(days)))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use sentinel_core::{AppError, TenantContext};
    use sentinel_domain::{AuditActionType, MemberRole, ThreatObservation, ThreatSeverity};
    use serde_json::json;

    use super::{ThreatListQuery, ThreatService};
    use crate::test_support::FakeStore;
    use crate::{AccessService, AuditRetryPolicy};

    fn service(store: &Arc<FakeStore>) -> ThreatService {
        ThreatService::new(
            store.clone(),
            AccessService::new(store.clone()),
            AuditRetryPolicy::default(),
        )
    }

    fn observation(risk_score: f64, days_ago: i64) -> ThreatObservation {
        ThreatObservation {
            occurred_at: Utc::now() - Duration::days(days_ago),
            source_ip: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 77)),
            destination_ip: None,
            user_ref: Some("svc-backup".to_owned()),
            user_agent: Some("python-requests/2.32".to_owned()),
            action: "login_attempt".to_owned(),
            resource: "/api/session".to_owned(),
            method: Some("POST".to_owned()),
            status_code: Some(401),
            anomaly_score: 0.8,
            risk_score,
            is_blocked: true,
            ai_flagged: true,
            raw_data: json!({"attempts": 42}),
        }
    }

    async fn ingest(service: &ThreatService, context: &TenantContext, risk: f64, days_ago: i64) {
        let result = service
            .ingest(context, observation(risk, days_ago), None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn listing_filters_by_window_and_severity() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;
        let service = service(&store);
        ingest(&service, &context, 0.95, 1).await;
        ingest(&service, &context, 0.2, 2).await;
        ingest(&service, &context, 0.95, 30).await;

        let recent_critical = service
            .list(
                &context,
                ThreatListQuery {
                    severity: Some(ThreatSeverity::Critical),
                    ..ThreatListQuery::default()
                },
            )
            .await
            .unwrap_or_default();

        assert_eq!(recent_critical.len(), 1);
        assert_eq!(recent_critical[0].severity, ThreatSeverity::Critical);
    }

    #[tokio::test]
    async fn window_outside_bounds_is_rejected() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;

        let result = service(&store)
            .list(
                &context,
                ThreatListQuery {
                    days: 91,
                    ..ThreatListQuery::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn summary_reports_every_severity() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;
        let service = service(&store);
        ingest(&service, &context, 0.95, 1).await;
        ingest(&service, &context, 0.75, 1).await;
        ingest(&service, &context, 0.76, 1).await;

        let summary = service.summary(&context, 7).await.unwrap_or_default();

        assert_eq!(summary.len(), 4);
        let count_of = |severity: ThreatSeverity| {
            summary
                .iter()
                .find(|bucket| bucket.severity == severity)
                .map(|bucket| bucket.count)
        };
        assert_eq!(count_of(ThreatSeverity::High), Some(2));
        assert_eq!(count_of(ThreatSeverity::Low), Some(0));
    }

    #[tokio::test]
    async fn false_positive_is_audited_with_old_and_new_values() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Analyst).await;
        let service = service(&store);
        let threat = service
            .ingest(&context, observation(0.9, 0), None)
            .await
            .unwrap_or_else(|_| unreachable!());

        let result = service
            .flag_false_positive(&context, threat.id(), Some("known scanner".to_owned()))
            .await;

        assert!(result.is_ok());
        let flagged = result.unwrap_or_else(|_| unreachable!());
        assert_eq!(flagged.false_positive, Some(true));
        assert!(!flagged.observation.is_blocked);

        let chain = store.chain_of(context.tenant_id()).await;
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].action_type(), AuditActionType::FalsePositiveFlagged);
        assert!(chain[0].old_values().is_some());
        assert!(chain[0].new_values().is_some());
    }

    #[tokio::test]
    async fn foreign_threats_are_not_found() {
        let store = Arc::new(FakeStore::default());
        let (tenant_a, _) = store.seed_tenant(MemberRole::Analyst).await;
        let (tenant_b, _) = store.seed_tenant(MemberRole::Analyst).await;
        let service = service(&store);
        let threat = service
            .ingest(&tenant_b, observation(0.5, 0), None)
            .await
            .unwrap_or_else(|_| unreachable!());

        let read = service.get(&tenant_a, threat.id()).await;
        let flagged = service.flag_false_positive(&tenant_a, threat.id(), None).await;
        let listed = service
            .list(&tenant_a, ThreatListQuery::default())
            .await
            .unwrap_or_default();

        assert!(matches!(read, Err(AppError::NotFound(_))));
        assert!(matches!(flagged, Err(AppError::NotFound(_))));
        assert!(listed.is_empty());
        assert!(store.chain_of(tenant_a.tenant_id()).await.is_empty());
        assert!(store.chain_of(tenant_b.tenant_id()).await.is_empty());
    }

    #[tokio::test]
    async fn viewers_cannot_ingest() {
        let store = Arc::new(FakeStore::default());
        let (context, _) = store.seed_tenant(MemberRole::Viewer).await;

        let result = service(&store)
            .ingest(&context, observation(0.5, 0), None)
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
