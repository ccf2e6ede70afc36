use std::future::Future;

use sentinel_core::{AppError, AppResult, TenantContext};
use tracing::warn;

/// Default number of attempts for one audited write.
pub const DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS: u32 = 5;

/// Bounded retry of audited writes that lost the chain-tail race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRetryPolicy {
    max_attempts: u32,
}

impl AuditRetryPolicy {
    /// Creates a policy allowing `max_attempts` tries, between 1 and 20.
    pub fn new(max_attempts: u32) -> AppResult<Self> {
        if !(1..=20).contains(&max_attempts) {
            return Err(AppError::Validation(format!(
                "audit append attempts must be between 1 and 20, got {max_attempts}"
            )));
        }

        Ok(Self { max_attempts })
    }

    /// Returns the attempt limit.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `attempt` until it succeeds, fails with anything other than an
    /// audit write conflict, or the attempt limit is reached.
    ///
    /// Each attempt must be one whole transaction so that a conflict leaves
    /// nothing behind.
    pub async fn run<T, F, Fut>(
        &self,
        context: &TenantContext,
        operation: &'static str,
        mut attempt: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt_number = 1;
        loop {
            match attempt().await {
                Err(AppError::AuditWriteConflict(message)) if attempt_number < self.max_attempts => {
                    warn!(
                        tenant_id = %context.tenant_id(),
                        operation,
                        attempt = attempt_number,
                        error = %message,
                        "audit chain tail moved, retrying"
                    );
                    attempt_number += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for AuditRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS,
        }
    }
}
