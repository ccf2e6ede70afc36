use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::ApiKeyRepository;
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{ApiKey, AuditDraft, AuditRecord, admit_write, not_found};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::postgres_audit_trail_repository::append_in_transaction;
use crate::postgres_tenant_scope::{begin_tenant_transaction, commit, conflict_or_internal};

/// PostgreSQL-backed API key repository. Only key hashes are stored.
#[derive(Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: Uuid,
    tenant_id: Uuid,
    member_id: Option<Uuid>,
    key_hash: String,
    key_prefix: String,
    name: String,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ApiKeyRow {
    fn into_api_key(self) -> AppResult<ApiKey> {
        ApiKey::from_parts(
            self.id,
            TenantId::from_uuid(self.tenant_id),
            self.member_id,
            self.key_hash,
            self.key_prefix,
            self.name,
            self.is_active,
            self.expires_at,
            self.last_used_at,
            self.created_at,
        )
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn list_api_keys(&self, context: &TenantContext) -> AppResult<Vec<ApiKey>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT
                id, tenant_id, member_id, key_hash, key_prefix, name,
                is_active, expires_at, last_used_at, created_at
            FROM api_keys
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list api keys: {error}")))?;
        commit(transaction).await?;

        rows.into_iter().map(ApiKeyRow::into_api_key).collect()
    }

    async fn find_api_key(&self, context: &TenantContext, api_key_id: Uuid) -> AppResult<ApiKey> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT
                id, tenant_id, member_id, key_hash, key_prefix, name,
                is_active, expires_at, last_used_at, created_at
            FROM api_keys
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(api_key_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find api key: {error}")))?;
        commit(transaction).await?;

        row.ok_or_else(|| not_found::<ApiKey>(api_key_id))?
            .into_api_key()
    }

    async fn create_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, api_key)?;

        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id,
                tenant_id,
                member_id,
                key_hash,
                key_prefix,
                name,
                is_active,
                expires_at,
                last_used_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(api_key.id())
        .bind(context.tenant_id().as_uuid())
        .bind(api_key.member_id())
        .bind(api_key.key_hash())
        .bind(api_key.key_prefix())
        .bind(api_key.name())
        .bind(api_key.is_active)
        .bind(api_key.expires_at())
        .bind(api_key.last_used_at)
        .bind(api_key.created_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| conflict_or_internal(error, "api key already exists", "create api key"))?;

        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }

    async fn save_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, api_key)?;

        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let updated = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = $3,
                last_used_at = $4
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(api_key.id())
        .bind(api_key.is_active)
        .bind(api_key.last_used_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save api key: {error}")))?
        .rows_affected();

        if updated == 0 {
            return Err(not_found::<ApiKey>(api_key.id()));
        }

        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }
}
