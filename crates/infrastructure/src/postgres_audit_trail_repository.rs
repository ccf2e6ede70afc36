use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{ArchiveBatch, AuditRecordQuery, AuditTrailRepository};
use sentinel_core::{ActorContext, AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AuditActionType, AuditDraft, AuditRecord, AuditValues, ChainTail, GENESIS_HASH, ResourceType,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::postgres_tenant_scope::{
    TenantTransaction, audit_write_error, begin_tenant_transaction, column_error, commit,
};

/// PostgreSQL-backed hash-chained audit trail.
///
/// Appends lock the tenant's `audit_chain_heads` row, so concurrent writers
/// of one tenant are serialized while other tenants proceed.
#[derive(Clone)]
pub struct PostgresAuditTrailRepository {
    pool: PgPool,
}

impl PostgresAuditTrailRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChainHeadRow {
    last_sequence: i64,
    last_hash: String,
    last_recorded_at: Option<DateTime<Utc>>,
}

impl ChainHeadRow {
    fn into_tail(self) -> AppResult<ChainTail> {
        Ok(ChainTail {
            sequence: u64::try_from(self.last_sequence)
                .map_err(|error| column_error("last_sequence", error))?,
            content_hash: self.last_hash,
            recorded_at: self.last_recorded_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRecordRow {
    id: Uuid,
    tenant_id: Uuid,
    sequence: i64,
    action_type: String,
    resource_type: String,
    resource_id: Option<String>,
    old_values: Option<Json<AuditValues>>,
    new_values: Option<Json<AuditValues>>,
    actor_subject: String,
    actor_member_id: Option<Uuid>,
    actor_ip_address: Option<String>,
    actor_user_agent: Option<String>,
    recorded_at: DateTime<Utc>,
    content_hash: String,
    previous_hash: String,
}

impl AuditRecordRow {
    fn into_record(self) -> AppResult<AuditRecord> {
        let ip_address = self
            .actor_ip_address
            .map(|value| {
                value
                    .parse::<IpAddr>()
                    .map_err(|error| column_error("actor_ip_address", error))
            })
            .transpose()?;

        Ok(AuditRecord::from_parts(
            self.id,
            TenantId::from_uuid(self.tenant_id),
            u64::try_from(self.sequence).map_err(|error| column_error("sequence", error))?,
            self.action_type
                .parse::<AuditActionType>()
                .map_err(|error| column_error("action_type", error))?,
            self.resource_type
                .parse::<ResourceType>()
                .map_err(|error| column_error("resource_type", error))?,
            self.resource_id,
            self.old_values.map(|values| values.0),
            self.new_values.map(|values| values.0),
            ActorContext::from_parts(
                self.actor_subject,
                self.actor_member_id,
                ip_address,
                self.actor_user_agent,
            ),
            self.recorded_at,
            self.content_hash,
            self.previous_hash,
        ))
    }
}

fn sequence_param(sequence: u64) -> AppResult<i64> {
    i64::try_from(sequence)
        .map_err(|_| AppError::Validation(format!("sequence {sequence} is out of range")))
}

/// Seals `draft` against the locked chain head and inserts it inside the
/// caller's transaction.
///
/// Business adapters call this in the same transaction as their mutation, so
/// the mutation and its audit record commit or roll back together.
pub(crate) async fn append_in_transaction(
    transaction: &mut TenantTransaction,
    context: &TenantContext,
    draft: AuditDraft,
) -> AppResult<AuditRecord> {
    let tenant_id = context.tenant_id();

    sqlx::query(
        r#"
        INSERT INTO audit_chain_heads (tenant_id, last_sequence, last_hash)
        VALUES ($1, 0, $2)
        ON CONFLICT (tenant_id) DO NOTHING
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(GENESIS_HASH)
    .execute(&mut **transaction)
    .await
    .map_err(|error| audit_write_error(error, "open audit chain head"))?;

    let head = sqlx::query_as::<_, ChainHeadRow>(
        r#"
        SELECT last_sequence, last_hash, last_recorded_at
        FROM audit_chain_heads
        WHERE tenant_id = $1
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .fetch_one(&mut **transaction)
    .await
    .map_err(|error| audit_write_error(error, "lock audit chain head"))?;

    let tail = head.into_tail()?;
    let record = AuditRecord::seal(context, draft, &tail, Utc::now());
    let sequence = sequence_param(record.sequence())?;

    sqlx::query(
        r#"
        INSERT INTO audit_records (
            id,
            tenant_id,
            sequence,
            action_type,
            resource_type,
            resource_id,
            old_values,
            new_values,
            actor_subject,
            actor_member_id,
            actor_ip_address,
            actor_user_agent,
            recorded_at,
            content_hash,
            previous_hash
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(record.id())
    .bind(tenant_id.as_uuid())
    .bind(sequence)
    .bind(record.action_type().as_str())
    .bind(record.resource_type().as_str())
    .bind(record.resource_id())
    .bind(record.old_values().cloned().map(Json))
    .bind(record.new_values().cloned().map(Json))
    .bind(record.actor().subject())
    .bind(record.actor().member_id())
    .bind(record.actor().ip_address().map(|address| address.to_string()))
    .bind(record.actor().user_agent())
    .bind(record.recorded_at())
    .bind(record.content_hash())
    .bind(record.previous_hash())
    .execute(&mut **transaction)
    .await
    .map_err(|error| audit_write_error(error, "insert audit record"))?;

    sqlx::query(
        r#"
        UPDATE audit_chain_heads
        SET last_sequence = $2,
            last_hash = $3,
            last_recorded_at = $4,
            updated_at = now()
        WHERE tenant_id = $1
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(sequence)
    .bind(record.content_hash())
    .bind(record.recorded_at())
    .execute(&mut **transaction)
    .await
    .map_err(|error| audit_write_error(error, "advance audit chain head"))?;

    debug!(
        tenant_id = %tenant_id,
        sequence = record.sequence(),
        action_type = record.action_type().as_str(),
        "audit record appended"
    );

    Ok(record)
}

#[async_trait]
impl AuditTrailRepository for PostgresAuditTrailRepository {
    async fn append(&self, context: &TenantContext, draft: AuditDraft) -> AppResult<AuditRecord> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let record = append_in_transaction(&mut transaction, context, draft).await?;
        commit(transaction).await?;
        Ok(record)
    }

    async fn list_records(
        &self,
        context: &TenantContext,
        query: &AuditRecordQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT
                id,
                tenant_id,
                sequence,
                action_type,
                resource_type,
                resource_id,
                old_values,
                new_values,
                actor_subject,
                actor_member_id,
                actor_ip_address,
                actor_user_agent,
                recorded_at,
                content_hash,
                previous_hash
            FROM audit_records
            WHERE tenant_id = $1
                AND ($2::TEXT IS NULL OR action_type = $2)
                AND ($3::TEXT IS NULL OR resource_type = $3)
                AND ($4::TEXT IS NULL OR resource_id = $4)
                AND ($5::TEXT IS NULL OR actor_subject = $5)
                AND ($6::TIMESTAMPTZ IS NULL OR recorded_at >= $6)
                AND ($7::TIMESTAMPTZ IS NULL OR recorded_at < $7)
            ORDER BY sequence DESC
            LIMIT $8
            OFFSET $9
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(query.action_type.map(|action_type| action_type.as_str()))
        .bind(query.resource_type.map(|resource_type| resource_type.as_str()))
        .bind(query.resource_id.as_deref())
        .bind(query.actor_subject.as_deref())
        .bind(query.recorded_after)
        .bind(query.recorded_before)
        .bind(i64::from(query.limit))
        .bind(i64::from(query.offset))
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit records: {error}")))?;
        commit(transaction).await?;

        rows.into_iter().map(AuditRecordRow::into_record).collect()
    }

    async fn read_chain_head(&self, context: &TenantContext) -> AppResult<Option<ChainTail>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let head = sqlx::query_as::<_, ChainHeadRow>(
            r#"
            SELECT last_sequence, last_hash, last_recorded_at
            FROM audit_chain_heads
            WHERE tenant_id = $1
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read audit chain head: {error}")))?;
        commit(transaction).await?;

        head.map(ChainHeadRow::into_tail).transpose()
    }

    async fn read_chain(
        &self,
        context: &TenantContext,
        after_sequence: u64,
        limit: u32,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT
                id,
                tenant_id,
                sequence,
                action_type,
                resource_type,
                resource_id,
                old_values,
                new_values,
                actor_subject,
                actor_member_id,
                actor_ip_address,
                actor_user_agent,
                recorded_at,
                content_hash,
                previous_hash
            FROM (
                SELECT
                    id, tenant_id, sequence, action_type, resource_type, resource_id,
                    old_values, new_values, actor_subject, actor_member_id,
                    actor_ip_address, actor_user_agent, recorded_at, content_hash,
                    previous_hash
                FROM audit_records_archive
                WHERE tenant_id = $1 AND sequence > $2
                UNION ALL
                SELECT
                    id, tenant_id, sequence, action_type, resource_type, resource_id,
                    old_values, new_values, actor_subject, actor_member_id,
                    actor_ip_address, actor_user_agent, recorded_at, content_hash,
                    previous_hash
                FROM audit_records
                WHERE tenant_id = $1 AND sequence > $2
            ) chain
            ORDER BY sequence ASC
            LIMIT $3
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(sequence_param(after_sequence)?)
        .bind(i64::from(limit))
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read audit chain: {error}")))?;
        commit(transaction).await?;

        rows.into_iter().map(AuditRecordRow::into_record).collect()
    }

    async fn archive_before(
        &self,
        context: &TenantContext,
        cutoff: DateTime<Utc>,
    ) -> AppResult<ArchiveBatch> {
        let tenant_id = context.tenant_id().as_uuid();
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;

        // Holding the head keeps appends out while records change tables.
        let head = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT last_sequence
            FROM audit_chain_heads
            WHERE tenant_id = $1
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| audit_write_error(error, "lock audit chain head"))?;
        if head.is_none() {
            commit(transaction).await?;
            return Ok(ArchiveBatch::default());
        }

        let archived = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO audit_records_archive (
                id,
                tenant_id,
                sequence,
                action_type,
                resource_type,
                resource_id,
                old_values,
                new_values,
                actor_subject,
                actor_member_id,
                actor_ip_address,
                actor_user_agent,
                recorded_at,
                content_hash,
                previous_hash
            )
            SELECT
                id,
                tenant_id,
                sequence,
                action_type,
                resource_type,
                resource_id,
                old_values,
                new_values,
                actor_subject,
                actor_member_id,
                actor_ip_address,
                actor_user_agent,
                recorded_at,
                content_hash,
                previous_hash
            FROM audit_records
            WHERE tenant_id = $1 AND recorded_at < $2
            ORDER BY sequence ASC
            RETURNING sequence
            "#,
        )
        .bind(tenant_id)
        .bind(cutoff)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| audit_write_error(error, "archive audit records"))?;

        if archived.is_empty() {
            commit(transaction).await?;
            return Ok(ArchiveBatch::default());
        }

        let removed = sqlx::query(
            r#"
            DELETE FROM audit_records
            WHERE tenant_id = $1 AND recorded_at < $2
            "#,
        )
        .bind(tenant_id)
        .bind(cutoff)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to remove archived audit records: {error}"))
        })?
        .rows_affected();

        if removed != archived.len() as u64 {
            return Err(AppError::Internal(format!(
                "archived {} audit records but removed {removed}",
                archived.len()
            )));
        }

        commit(transaction).await?;

        let archived_through_sequence = archived
            .iter()
            .max()
            .map(|sequence| u64::try_from(*sequence))
            .transpose()
            .map_err(|error| column_error("sequence", error))?;

        Ok(ArchiveBatch {
            archived_count: removed,
            archived_through_sequence,
        })
    }
}
