use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{AuditActionType, AuditDraft, AuditRecord, ChainTail, ResourceType};

/// Filters and pagination for audit record listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecordQuery {
    /// Optional action filter.
    pub action_type: Option<AuditActionType>,
    /// Optional resource type filter.
    pub resource_type: Option<ResourceType>,
    /// Optional resource id filter.
    pub resource_id: Option<String>,
    /// Optional actor subject filter.
    pub actor_subject: Option<String>,
    /// Only records at or after this instant.
    pub recorded_after: Option<DateTime<Utc>>,
    /// Only records strictly before this instant.
    pub recorded_before: Option<DateTime<Utc>>,
    /// Maximum rows returned.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
}

impl Default for AuditRecordQuery {
    fn default() -> Self {
        Self {
            action_type: None,
            resource_type: None,
            resource_id: None,
            actor_subject: None,
            recorded_after: None,
            recorded_before: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Records moved from the live chain into the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveBatch {
    /// Number of records moved.
    pub archived_count: u64,
    /// Highest archived sequence, if any record moved.
    pub archived_through_sequence: Option<u64>,
}

/// Repository port for the per-tenant audit chain.
///
/// There is intentionally no method that updates or deletes a record.
#[async_trait]
pub trait AuditTrailRepository: Send + Sync {
    /// Seals and appends one record at the tail of the tenant chain.
    ///
    /// Appends for one tenant are serialized. A lost race on the tail is
    /// reported as `AppError::AuditWriteConflict` with nothing persisted.
    async fn append(&self, context: &TenantContext, draft: AuditDraft) -> AppResult<AuditRecord>;

    /// Lists live records newest first.
    async fn list_records(
        &self,
        context: &TenantContext,
        query: &AuditRecordQuery,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Returns the persisted head of the tenant chain, `None` when the
    /// tenant never appended.
    ///
    /// The head advances in the same transaction as each append, so every
    /// sequence up to it belongs to a committed record.
    async fn read_chain_head(&self, context: &TenantContext) -> AppResult<Option<ChainTail>>;

    /// Reads archived and live records with `sequence > after_sequence` in
    /// ascending sequence order.
    async fn read_chain(
        &self,
        context: &TenantContext,
        after_sequence: u64,
        limit: u32,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Moves live records recorded before `cutoff` into the archive.
    async fn archive_before(
        &self,
        context: &TenantContext,
        cutoff: DateTime<Utc>,
    ) -> AppResult<ArchiveBatch>;
}
