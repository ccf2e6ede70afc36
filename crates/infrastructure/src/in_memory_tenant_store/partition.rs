use std::collections::HashMap;

use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{TenantScoped, admit_write, not_found};
use uuid::Uuid;

/// Storage for one kind of tenant-scoped row.
///
/// Rows are grouped by owning tenant and every accessor takes the active
/// [`TenantContext`], so there is no way to reach another tenant's rows
/// through a partition.
#[derive(Debug)]
pub struct TenantPartition<T> {
    rows: HashMap<TenantId, Vec<T>>,
}

impl<T> Default for TenantPartition<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T: TenantScoped + Clone> TenantPartition<T> {
    /// Creates an empty partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates the active tenant's rows in insertion order.
    pub fn iter<'a>(&'a self, context: &TenantContext) -> impl Iterator<Item = &'a T> + 'a {
        self.rows
            .get(&context.tenant_id())
            .into_iter()
            .flat_map(|rows| rows.iter())
    }

    /// Returns the number of rows owned by the active tenant.
    #[must_use]
    pub fn count(&self, context: &TenantContext) -> usize {
        self.rows
            .get(&context.tenant_id())
            .map_or(0, Vec::len)
    }

    /// Returns one row of the active tenant.
    pub fn get(&self, context: &TenantContext, row_id: Uuid) -> AppResult<T> {
        self.iter(context)
            .find(|row| row.row_id() == row_id)
            .cloned()
            .ok_or_else(|| not_found::<T>(row_id))
    }

    /// Checks that a row could be replaced without changing anything.
    pub fn ensure_replaceable(&self, context: &TenantContext, row: &T) -> AppResult<()> {
        admit_write(context, row)?;
        if self.iter(context).any(|stored| stored.row_id() == row.row_id()) {
            return Ok(());
        }

        Err(not_found::<T>(row.row_id()))
    }

    /// Checks that a row could be inserted without changing anything.
    pub fn ensure_insertable(&self, context: &TenantContext, row: &T) -> AppResult<()> {
        admit_write(context, row)?;
        if self.rows.values().flatten().any(|stored| stored.row_id() == row.row_id()) {
            return Err(AppError::Conflict(format!(
                "{} '{}' already exists",
                T::ENTITY_LABEL,
                row.row_id()
            )));
        }

        Ok(())
    }

    /// Inserts a row owned by the active tenant.
    pub fn insert(&mut self, context: &TenantContext, row: T) -> AppResult<()> {
        self.ensure_insertable(context, &row)?;
        self.rows.entry(context.tenant_id()).or_default().push(row);
        Ok(())
    }

    /// Replaces an existing row of the active tenant.
    pub fn replace(&mut self, context: &TenantContext, row: T) -> AppResult<()> {
        admit_write(context, &row)?;
        let slot = self
            .rows
            .get_mut(&context.tenant_id())
            .and_then(|rows| rows.iter_mut().find(|stored| stored.row_id() == row.row_id()))
            .ok_or_else(|| not_found::<T>(row.row_id()))?;
        *slot = row;
        Ok(())
    }

    /// Applies `update` to every row of the active tenant matching `filter`
    /// and returns how many rows it touched.
    pub fn update_where(
        &mut self,
        context: &TenantContext,
        filter: impl Fn(&T) -> bool,
        mut update: impl FnMut(&mut T),
    ) -> usize {
        let Some(rows) = self.rows.get_mut(&context.tenant_id()) else {
            return 0;
        };

        let mut touched = 0;
        for row in rows.iter_mut().filter(|row| filter(row)) {
            update(row);
            touched += 1;
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::{AppError, TenantContext, TenantId};
    use uuid::Uuid;

    use super::TenantPartition;
    use sentinel_domain::TenantScoped;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Uuid,
        tenant_id: TenantId,
        body: &'static str,
    }

    impl TenantScoped for Note {
        const ENTITY_LABEL: &'static str = "note";

        fn tenant_id(&self) -> TenantId {
            self.tenant_id
        }

        fn row_id(&self) -> Uuid {
            self.id
        }
    }

    fn note(tenant_id: TenantId, body: &'static str) -> Note {
        Note {
            id: Uuid::new_v4(),
            tenant_id,
            body,
        }
    }

    #[test]
    fn rows_are_only_visible_to_their_tenant() {
        let left = TenantContext::system(TenantId::new(), "test");
        let right = TenantContext::system(TenantId::new(), "test");
        let mut partition = TenantPartition::new();
        let left_note = note(left.tenant_id(), "left");
        assert!(partition.insert(&left, left_note.clone()).is_ok());

        assert_eq!(partition.count(&left), 1);
        assert_eq!(partition.count(&right), 0);
        assert!(partition.get(&left, left_note.id).is_ok());
        assert!(matches!(
            partition.get(&right, left_note.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn foreign_rows_are_rejected_on_insert_and_replace() {
        let left = TenantContext::system(TenantId::new(), "test");
        let right = TenantContext::system(TenantId::new(), "test");
        let mut partition = TenantPartition::new();
        let left_note = note(left.tenant_id(), "left");
        assert!(partition.insert(&left, left_note.clone()).is_ok());

        let smuggled = partition.insert(&left, note(right.tenant_id(), "smuggled"));
        let hijacked = partition.replace(
            &right,
            Note {
                body: "hijacked",
                ..left_note.clone()
            },
        );

        assert!(matches!(smuggled, Err(AppError::NotFound(_))));
        assert!(matches!(hijacked, Err(AppError::NotFound(_))));
        assert_eq!(partition.count(&right), 0);
        assert_eq!(
            partition.get(&left, left_note.id).map(|stored| stored.body).ok(),
            Some("left")
        );
    }

    #[test]
    fn update_where_never_touches_foreign_rows() {
        let left = TenantContext::system(TenantId::new(), "test");
        let right = TenantContext::system(TenantId::new(), "test");
        let mut partition = TenantPartition::new();
        assert!(partition.insert(&left, note(left.tenant_id(), "a")).is_ok());
        assert!(partition.insert(&right, note(right.tenant_id(), "b")).is_ok());

        let touched = partition.update_where(&left, |_| true, |row| row.body = "updated");

        assert_eq!(touched, 1);
        assert!(partition.iter(&right).all(|row| row.body == "b"));
    }
}
