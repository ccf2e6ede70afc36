use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sentinel_core::{AppError, AppResult, TenantContext};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditRecord, AuditValues, ChainTail, ChainVerifier, Divergence,
    DivergenceReason, ResourceType, VerificationResult,
};
use tracing::{error, info};

use crate::AccessService;
use crate::AuditRetryPolicy;
use crate::ports::{AuditRecordQuery, AuditTrailRepository, OrganizationRepository};

/// Largest page returned by audit record listing.
pub const MAX_AUDIT_PAGE_SIZE: u32 = 500;

/// Deepest offset accepted by audit record listing.
pub const MAX_AUDIT_OFFSET: u32 = 10_000;

/// Default number of records read per verification page.
pub const DEFAULT_VERIFY_PAGE_SIZE: u32 = 500;

/// Result of one retention archival run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// Records recorded before this instant were archived.
    pub cutoff: DateTime<Utc>,
    /// Number of records moved to the archive.
    pub archived_count: u64,
    /// Highest archived sequence, if any record moved.
    pub archived_through_sequence: Option<u64>,
    /// Audit record documenting the run, if any record moved.
    pub audit_record: Option<AuditRecord>,
}

/// Application service for the tenant audit chain.
#[derive(Clone)]
pub struct AuditTrailService {
    repository: Arc<dyn AuditTrailRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
    verify_page_size: u32,
}

impl AuditTrailService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AuditTrailRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            organizations,
            access,
            retry,
            verify_page_size: DEFAULT_VERIFY_PAGE_SIZE,
        }
    }

    /// Overrides the verification page size, clamped to `1..=5000`.
    #[must_use]
    pub fn with_verify_page_size(mut self, verify_page_size: u32) -> Self {
        self.verify_page_size = verify_page_size.clamp(1, 5_000);
        self
    }

    /// Appends one record to the active tenant's chain.
    pub async fn append(&self, context: &TenantContext, draft: AuditDraft) -> AppResult<AuditRecord> {
        self.retry
            .run(context, "audit_append", || {
                self.repository.append(context, draft.clone())
            })
            .await
    }

    /// Lists the active tenant's live records newest first.
    pub async fn list_records(
        &self,
        context: &TenantContext,
        query: AuditRecordQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        self.access.require_triage(context).await?;
        let query = normalize_query(query)?;
        self.repository.list_records(context, &query).await
    }

    /// Walks the active tenant's archived and live records in sequence order
    /// up to the persisted chain head.
    ///
    /// The head is read first and bounds the walk, so records appended
    /// during verification are left for the next run. A walk that stops
    /// short of the head reports the lost records. A divergence is a
    /// result, not an error. It is logged and returned, never repaired.
    pub async fn verify_chain(&self, context: &TenantContext) -> AppResult<VerificationResult> {
        self.access.require_triage(context).await?;

        let head = self.repository.read_chain_head(context).await?;
        let bound = head.as_ref().map_or(0, |head| head.sequence);
        let mut verifier = ChainVerifier::new(context.tenant_id());
        'walk: loop {
            let page = self
                .repository
                .read_chain(context, verifier.tail().sequence, self.verify_page_size)
                .await?;
            let page_len = page.len();

            for record in &page {
                if record.sequence() > bound {
                    if head.is_some() {
                        break 'walk;
                    }
                    return Ok(diverged(
                        context,
                        Divergence {
                            record_id: record.id(),
                            sequence: record.sequence(),
                            reason: DivergenceReason::LinkageBroken,
                        },
                    ));
                }

                if let Err(divergence) = verifier.observe(record) {
                    return Ok(diverged(context, divergence));
                }
            }

            if page_len < self.verify_page_size as usize {
                break;
            }
        }

        let result = verifier.finish_at(&head.unwrap_or_else(ChainTail::genesis));
        if let VerificationResult::Diverged(divergence) = result {
            return Ok(diverged(context, divergence));
        }

        Ok(result)
    }

    /// Moves records older than the organization's retention window into
    /// the archive and records the run in the chain.
    pub async fn archive_expired(&self, context: &TenantContext) -> AppResult<ArchiveOutcome> {
        self.access.require_admin(context).await?;

        let organization = self.organizations.find_organization(context).await?;
        let retention_days = organization.quotas().retention_days;
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let batch = self.repository.archive_before(context, cutoff).await?;
        if batch.archived_count == 0 {
            return Ok(ArchiveOutcome {
                cutoff,
                archived_count: 0,
                archived_through_sequence: None,
                audit_record: None,
            });
        }

        let mut values = AuditValues::new()
            .with(
                "archived_count",
                i64::try_from(batch.archived_count).unwrap_or(i64::MAX),
            )
            .with(
                "cutoff",
                cutoff.to_rfc3339_opts(SecondsFormat::Micros, true),
            );
        if let Some(sequence) = batch.archived_through_sequence {
            values = values.with(
                "archived_through_sequence",
                i64::try_from(sequence).unwrap_or(i64::MAX),
            );
        }

        let draft = AuditDraft::new(
            AuditActionType::AuditRecordsArchived,
            ResourceType::AuditTrail,
            None,
            None,
            Some(values),
        )?;
        let audit_record = self.append(context, draft).await?;

        info!(
            tenant_id = %context.tenant_id(),
            archived_count = batch.archived_count,
            retention_days,
            "archived expired audit records"
        );

        Ok(ArchiveOutcome {
            cutoff,
            archived_count: batch.archived_count,
            archived_through_sequence: batch.archived_through_sequence,
            audit_record: Some(audit_record),
        })
    }
}

fn diverged(context: &TenantContext, divergence: Divergence) -> VerificationResult {
    error!(
        tenant_id = %context.tenant_id(),
        record_id = %divergence.record_id,
        sequence = divergence.sequence,
        reason = divergence.reason.as_str(),
        "audit chain diverged"
    );
    VerificationResult::Diverged(divergence)
}

fn normalize_query(mut query: AuditRecordQuery) -> AppResult<AuditRecordQuery> {
    if query.offset > MAX_AUDIT_OFFSET {
        return Err(AppError::Validation(format!(
            "offset must be at most {MAX_AUDIT_OFFSET}"
        )));
    }

    if let (Some(after), Some(before)) = (query.recorded_after, query.recorded_before)
        && after >= before
    {
        return Err(AppError::Validation(
            "recorded_after must be earlier than recorded_before".to_owned(),
        ));
    }

    query.limit = query.limit.clamp(1, MAX_AUDIT_PAGE_SIZE);
    query.resource_id = non_blank(query.resource_id);
    query.actor_subject = non_blank(query.actor_subject);
    Ok(query)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
