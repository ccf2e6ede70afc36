use chrono::{DateTime, Utc};
use sentinel_application::ports::{ArchiveBatch, AuditRecordQuery};
use sentinel_core::TenantContext;
use sentinel_domain::{AuditDraft, AuditRecord, ChainTail};

/// Audit chain of one tenant. Callers hold the per-tenant mutex while
/// touching it, which serializes appends.
#[derive(Debug)]
pub(super) struct TenantChain {
    pub(super) archived: Vec<AuditRecord>,
    pub(super) live: Vec<AuditRecord>,
    tail: ChainTail,
}

impl Default for TenantChain {
    fn default() -> Self {
        Self {
            archived: Vec::new(),
            live: Vec::new(),
            tail: ChainTail::genesis(),
        }
    }
}

impl TenantChain {
    pub(super) fn append(
        &mut self,
        context: &TenantContext,
        draft: AuditDraft,
        now: DateTime<Utc>,
    ) -> AuditRecord {
        let record = AuditRecord::seal(context, draft, &self.tail, now);
        self.tail = ChainTail::of(&record);
        self.live.push(record.clone());
        record
    }

    /// Returns the tail written by the last append, `None` before the first.
    pub(super) fn head(&self) -> Option<ChainTail> {
        (self.tail.sequence > 0).then(|| self.tail.clone())
    }

    pub(super) fn list(&self, query: &AuditRecordQuery) -> Vec<AuditRecord> {
        self.live
            .iter()
            .rev()
            .filter(|record| matches_query(record, query))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect()
    }

    pub(super) fn read(&self, after_sequence: u64, limit: u32) -> Vec<AuditRecord> {
        self.archived
            .iter()
            .chain(self.live.iter())
            .filter(|record| record.sequence() > after_sequence)
            .take(limit as usize)
            .cloned()
            .collect()
    }

    /// Moves the live prefix recorded before `cutoff` into the archive.
    pub(super) fn archive_before(&mut self, cutoff: DateTime<Utc>) -> ArchiveBatch {
        let expired = self
            .live
            .iter()
            .take_while(|record| record.recorded_at() < cutoff)
            .count();
        let moved: Vec<AuditRecord> = self.live.drain(..expired).collect();

        let batch = ArchiveBatch {
            archived_count: moved.len() as u64,
            archived_through_sequence: moved.last().map(AuditRecord::sequence),
        };
        self.archived.extend(moved);
        batch
    }
}

fn matches_query(record: &AuditRecord, query: &AuditRecordQuery) -> bool {
    query
        .action_type
        .is_none_or(|action_type| record.action_type() == action_type)
        && query
            .resource_type
            .is_none_or(|resource_type| record.resource_type() == resource_type)
        && query
            .resource_id
            .as_deref()
            .is_none_or(|resource_id| record.resource_id() == Some(resource_id))
        && query
            .actor_subject
            .as_deref()
            .is_none_or(|subject| record.actor().subject() == subject)
        && query
            .recorded_after
            .is_none_or(|after| record.recorded_at() >= after)
        && query
            .recorded_before
            .is_none_or(|before| record.recorded_at() < before)
}
