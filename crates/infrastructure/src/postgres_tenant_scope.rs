//! Transaction scoping shared by every PostgreSQL adapter.
//!
//! Row level security reads the active tenant from the
//! `app.current_tenant_id` setting. The setting is transaction-local, so a
//! pooled connection never carries a tenant into the next unit of work.

use std::fmt::Display;

use sentinel_core::{AppError, AppResult, TenantId};
use sqlx::{PgPool, Postgres, Transaction};

/// Transaction bound to one tenant.
pub(crate) type TenantTransaction = Transaction<'static, Postgres>;

/// Opens a transaction with the tenant setting applied.
pub(crate) async fn begin_tenant_transaction(
    pool: &PgPool,
    tenant_id: TenantId,
) -> AppResult<TenantTransaction> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

    sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to apply tenant context: {error}"))
        })?;

    Ok(transaction)
}

/// Commits a tenant transaction.
///
/// Serialization failures at commit time are reported as audit write
/// conflicts so the caller can retry the whole unit of work.
pub(crate) async fn commit(transaction: TenantTransaction) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| audit_write_error(error, "commit transaction"))
}

/// Classifies errors raised while writing an audit record.
///
/// Lost races on the chain tail surface as serialization failures,
/// deadlocks or unique violations on the audit tables.
pub(crate) fn audit_write_error(error: sqlx::Error, operation: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error {
        let code = database_error.code();
        let is_race = match code.as_deref() {
            Some("40001" | "40P01") => true,
            Some("23505") => database_error
                .constraint()
                .is_some_and(|constraint| constraint.starts_with("audit_")),
            _ => false,
        };

        if is_race {
            return AppError::AuditWriteConflict(format!("failed to {operation}: {error}"));
        }
    }

    AppError::Internal(format!("failed to {operation}: {error}"))
}

/// Maps a unique violation to a business conflict.
pub(crate) fn conflict_or_internal(error: sqlx::Error, conflict: &str, operation: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(conflict.to_owned());
    }

    AppError::Internal(format!("failed to {operation}: {error}"))
}

/// Maps a stored column that no longer decodes into a domain value.
pub(crate) fn column_error(column: &str, error: impl Display) -> AppError {
    AppError::Internal(format!("stored column '{column}' is invalid: {error}"))
}
