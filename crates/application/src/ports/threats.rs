use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{AuditDraft, AuditRecord, ThreatLog, ThreatSeverity};
use uuid::Uuid;

/// Storage-level threat listing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatQuery {
    /// Optional severity filter.
    pub severity: Option<ThreatSeverity>,
    /// Only threats that occurred at or after this instant.
    pub since: DateTime<Utc>,
    /// Maximum rows returned.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
}

/// Number of threats of one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityCount {
    /// Severity bucket.
    pub severity: ThreatSeverity,
    /// Threats in the bucket.
    pub count: u64,
}

/// Repository port for threat logs.
#[async_trait]
pub trait ThreatRepository: Send + Sync {
    /// Stores an ingested threat.
    async fn insert_threat(&self, context: &TenantContext, threat: &ThreatLog) -> AppResult<()>;

    /// Lists threats newest first.
    async fn list_threats(
        &self,
        context: &TenantContext,
        query: &ThreatQuery,
    ) -> AppResult<Vec<ThreatLog>>;

    /// Returns one threat of the active tenant.
    async fn find_threat(&self, context: &TenantContext, threat_id: Uuid) -> AppResult<ThreatLog>;

    /// Persists triage changes and their audit record in one transaction.
    async fn save_threat(
        &self,
        context: &TenantContext,
        threat: &ThreatLog,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;

    /// Counts threats per severity since the given instant. Empty buckets
    /// may be omitted.
    async fn count_by_severity(
        &self,
        context: &TenantContext,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SeverityCount>>;
}
