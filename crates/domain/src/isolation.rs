//! Row isolation predicate shared by every storage adapter.

use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use uuid::Uuid;

/// Implemented by every entity that belongs to exactly one tenant.
///
/// `tenant_id` is fixed when the row is created. Implementors never expose a
/// setter for it.
pub trait TenantScoped {
    /// Human readable entity label used in not-found messages.
    const ENTITY_LABEL: &'static str;

    /// Returns the owning tenant.
    fn tenant_id(&self) -> TenantId;

    /// Returns the row identifier.
    fn row_id(&self) -> Uuid;
}

/// Returns whether the row is visible from the active tenant.
#[must_use]
pub fn is_visible<T: TenantScoped>(context: &TenantContext, row: &T) -> bool {
    row.tenant_id() == context.tenant_id()
}

/// Rejects writes of rows that belong to another tenant.
///
/// The rejection is reported as not-found so that callers cannot tell a
/// foreign row from a missing one.
pub fn admit_write<T: TenantScoped>(context: &TenantContext, row: &T) -> AppResult<()> {
    if is_visible(context, row) {
        return Ok(());
    }

    Err(not_found::<T>(row.row_id()))
}

/// Builds the not-found error used for both missing and foreign rows.
#[must_use]
pub fn not_found<T: TenantScoped>(row_id: Uuid) -> AppError {
    AppError::NotFound(format!("{} '{}' not found", T::ENTITY_LABEL, row_id))
}
