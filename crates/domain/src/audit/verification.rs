use sentinel_core::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditRecord, ChainTail};

/// Why a chain stopped verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// Stored fields no longer hash to the stored `content_hash`.
    HashMismatch,
    /// `previous_hash` does not match the preceding record, the record
    /// belongs to another tenant, or ordering went backwards.
    LinkageBroken,
    /// One or more records before this one are missing.
    MissingPredecessor,
}

impl DivergenceReason {
    /// Returns a stable label for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashMismatch => "hash_mismatch",
            Self::LinkageBroken => "linkage_broken",
            Self::MissingPredecessor => "missing_predecessor",
        }
    }
}

/// First point where a chain diverged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Record at which verification stopped.
    pub record_id: Uuid,
    /// Stored sequence of that record. For a chain that ends before its
    /// persisted head, the head's sequence and the last verified record
    /// (nil when none verified).
    pub sequence: u64,
    /// Divergence category.
    pub reason: DivergenceReason,
}

/// Outcome of walking one tenant chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    /// Every observed record hashed and linked correctly.
    Verified {
        /// Number of records checked.
        records_checked: u64,
        /// Sequence of the last checked record, `0` for an empty chain.
        tail_sequence: u64,
        /// Hash of the last checked record.
        tail_hash: String,
    },
    /// The chain is untrusted from this point on.
    Diverged(Divergence),
}

impl VerificationResult {
    /// Returns whether the chain verified.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Incremental verifier fed with one tenant's records in sequence order.
///
/// The verifier only reads records. It can be resumed from any trusted
/// anchor, which lets callers verify a long chain page by page.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    tenant_id: TenantId,
    expected: ChainTail,
    last_record_id: Option<Uuid>,
    records_checked: u64,
}

impl ChainVerifier {
    /// Starts verification at the genesis of a tenant chain.
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self::resume(tenant_id, ChainTail::genesis())
    }

    /// Starts verification after a trusted anchor.
    #[must_use]
    pub fn resume(tenant_id: TenantId, anchor: ChainTail) -> Self {
        Self {
            tenant_id,
            expected: anchor,
            last_record_id: None,
            records_checked: 0,
        }
    }

    /// Checks the next record of the chain.
    pub fn observe(&mut self, record: &AuditRecord) -> Result<(), Divergence> {
        let diverged = |reason| Divergence {
            record_id: record.id(),
            sequence: record.sequence(),
            reason,
        };

        if record.tenant_id() != self.tenant_id {
            return Err(diverged(DivergenceReason::LinkageBroken));
        }

        if record.compute_content_hash() != record.content_hash() {
            return Err(diverged(DivergenceReason::HashMismatch));
        }

        let next_sequence = self.expected.sequence + 1;
        if record.sequence() > next_sequence {
            return Err(diverged(DivergenceReason::MissingPredecessor));
        }

        if record.sequence() < next_sequence
            || record.previous_hash() != self.expected.content_hash
            || self
                .expected
                .recorded_at
                .is_some_and(|previous| record.recorded_at() < previous)
        {
            return Err(diverged(DivergenceReason::LinkageBroken));
        }

        self.expected = ChainTail::of(record);
        self.last_record_id = Some(record.id());
        self.records_checked += 1;
        Ok(())
    }

    /// Returns the last verified position.
    #[must_use]
    pub fn tail(&self) -> &ChainTail {
        &self.expected
    }

    /// Returns the number of records verified so far.
    #[must_use]
    pub fn records_checked(&self) -> u64 {
        self.records_checked
    }

    /// Finishes a walk in which every observed record verified.
    #[must_use]
    pub fn finish(self) -> VerificationResult {
        VerificationResult::Verified {
            records_checked: self.records_checked,
            tail_sequence: self.expected.sequence,
            tail_hash: self.expected.content_hash,
        }
    }

    /// Finishes a walk against the head persisted by the store.
    ///
    /// A walk that stops short of the head lost its newest records. A walk
    /// that reaches the head's sequence with a different hash reached a
    /// record the head never pointed at.
    #[must_use]
    pub fn finish_at(self, head: &ChainTail) -> VerificationResult {
        let record_id = self.last_record_id.unwrap_or_else(Uuid::nil);
        if self.expected.sequence < head.sequence {
            return VerificationResult::Diverged(Divergence {
                record_id,
                sequence: head.sequence,
                reason: DivergenceReason::MissingPredecessor,
            });
        }

        if self.expected.sequence > head.sequence
            || self.expected.content_hash != head.content_hash
        {
            return VerificationResult::Diverged(Divergence {
                record_id,
                sequence: self.expected.sequence,
                reason: DivergenceReason::LinkageBroken,
            });
        }

        self.finish()
    }

    /// Verifies a complete chain held in memory.
    #[must_use]
    pub fn verify_all<'a>(
        tenant_id: TenantId,
        records: impl IntoIterator<Item = &'a AuditRecord>,
    ) -> VerificationResult {
        let mut verifier = Self::new(tenant_id);
        for record in records {
            if let Err(divergence) = verifier.observe(record) {
                return VerificationResult::Diverged(divergence);
            }
        }

        verifier.finish()
    }
}
