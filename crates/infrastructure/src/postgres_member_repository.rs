use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{MemberRepository, RevokedSessions};
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AuditDraft, AuditRecord, Member, MemberRole, TenantScoped, admit_write, not_found,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::postgres_audit_trail_repository::append_in_transaction;
use crate::postgres_tenant_repository::lock_organization;
use crate::postgres_tenant_scope::{
    TenantTransaction, begin_tenant_transaction, column_error, commit, conflict_or_internal,
};

/// PostgreSQL-backed organization member repository.
#[derive(Clone)]
pub struct PostgresMemberRepository {
    pool: PgPool,
}

impl PostgresMemberRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    id: Uuid,
    tenant_id: Uuid,
    email: String,
    full_name: String,
    role: String,
    is_active: bool,
    sessions_revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MemberRow {
    fn into_member(self) -> AppResult<Member> {
        Member::from_parts(
            self.id,
            TenantId::from_uuid(self.tenant_id),
            self.email.as_str(),
            self.full_name.as_str(),
            self.role
                .parse::<MemberRole>()
                .map_err(|error| column_error("role", error))?,
            self.is_active,
            self.sessions_revoked_at,
            self.created_at,
        )
    }
}

/// Inserts a member inside an open tenant transaction.
pub(crate) async fn insert_member(
    transaction: &mut TenantTransaction,
    member: &Member,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO members (
            id,
            tenant_id,
            email,
            full_name,
            role,
            is_active,
            sessions_revoked_at,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(member.id())
    .bind(member.tenant_id().as_uuid())
    .bind(member.email())
    .bind(member.full_name())
    .bind(member.role.as_str())
    .bind(member.is_active)
    .bind(member.sessions_revoked_at)
    .bind(member.created_at())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        conflict_or_internal(
            error,
            &format!("member '{}' already exists", member.email()),
            "create member",
        )
    })?;

    Ok(())
}

#[async_trait]
impl MemberRepository for PostgresMemberRepository {
    async fn list_members(&self, context: &TenantContext) -> AppResult<Vec<Member>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, tenant_id, email, full_name, role, is_active, sessions_revoked_at, created_at
            FROM members
            WHERE tenant_id = $1
            ORDER BY email
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list members: {error}")))?;
        commit(transaction).await?;

        rows.into_iter().map(MemberRow::into_member).collect()
    }

    async fn find_member(&self, context: &TenantContext, member_id: Uuid) -> AppResult<Member> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, tenant_id, email, full_name, role, is_active, sessions_revoked_at, created_at
            FROM members
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(member_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find member: {error}")))?;
        commit(transaction).await?;

        row.ok_or_else(|| not_found::<Member>(member_id))?
            .into_member()
    }

    async fn create_member(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, member)?;

        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;

        // The organization row lock serializes concurrent invites of one tenant.
        let organization = lock_organization(&mut transaction, context.tenant_id()).await?;
        let seats = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM members
            WHERE tenant_id = $1
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count members: {error}")))?;
        organization
            .quotas()
            .admit_member(u64::try_from(seats).map_err(|error| column_error("count", error))?)?;

        insert_member(&mut transaction, member).await?;
        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }

    async fn revoke_member_sessions(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<RevokedSessions> {
        admit_write(context, member)?;

        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let updated = sqlx::query(
            r#"
            UPDATE members
            SET sessions_revoked_at = $3,
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(member.id())
        .bind(member.sessions_revoked_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke sessions: {error}")))?
        .rows_affected();

        if updated == 0 {
            return Err(not_found::<Member>(member.id()));
        }

        let revoked_api_keys = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = FALSE
            WHERE tenant_id = $1
                AND member_id = $2
                AND is_active
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(member.id())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to deactivate member api keys: {error}"))
        })?
        .rows_affected();

        let audit = audit.with_new_value(
            "revoked_api_keys",
            i64::try_from(revoked_api_keys).unwrap_or(i64::MAX),
        )?;
        let audit_record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(RevokedSessions {
            revoked_api_keys,
            audit_record,
        })
    }
}

#[cfg(test)]
mod tests;
