use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{SeverityCount, ThreatQuery, ThreatRepository};
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AuditDraft, AuditRecord, ThreatLog, ThreatObservation, ThreatSeverity, admit_write, not_found,
};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::postgres_audit_trail_repository::append_in_transaction;
use crate::postgres_tenant_scope::{
    begin_tenant_transaction, column_error, commit, conflict_or_internal,
};

/// PostgreSQL-backed threat log repository.
#[derive(Clone)]
pub struct PostgresThreatRepository {
    pool: PgPool,
}

impl PostgresThreatRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ThreatRow {
    id: Uuid,
    tenant_id: Uuid,
    occurred_at: DateTime<Utc>,
    source_ip: String,
    destination_ip: Option<String>,
    user_ref: Option<String>,
    user_agent: Option<String>,
    action: String,
    resource: String,
    method: Option<String>,
    status_code: Option<i32>,
    anomaly_score: f64,
    risk_score: f64,
    severity: String,
    is_blocked: bool,
    ai_flagged: bool,
    false_positive: Option<bool>,
    raw_data: Json<Value>,
    created_at: DateTime<Utc>,
}

impl ThreatRow {
    fn into_threat(self) -> AppResult<ThreatLog> {
        let observation = ThreatObservation {
            occurred_at: self.occurred_at,
            source_ip: self
                .source_ip
                .parse::<IpAddr>()
                .map_err(|error| column_error("source_ip", error))?,
            destination_ip: self
                .destination_ip
                .map(|value| {
                    value
                        .parse::<IpAddr>()
                        .map_err(|error| column_error("destination_ip", error))
                })
                .transpose()?,
            user_ref: self.user_ref,
            user_agent: self.user_agent,
            action: self.action,
            resource: self.resource,
            method: self.method,
            status_code: self
                .status_code
                .map(u16::try_from)
                .transpose()
                .map_err(|error| column_error("status_code", error))?,
            anomaly_score: self.anomaly_score,
            risk_score: self.risk_score,
            is_blocked: self.is_blocked,
            ai_flagged: self.ai_flagged,
            raw_data: self.raw_data.0,
        };

        Ok(ThreatLog::from_parts(
            self.id,
            TenantId::from_uuid(self.tenant_id),
            observation,
            self.severity
                .parse::<ThreatSeverity>()
                .map_err(|error| column_error("severity", error))?,
            self.false_positive,
            self.created_at,
        ))
    }
}

#[async_trait]
impl ThreatRepository for PostgresThreatRepository {
    async fn insert_threat(&self, context: &TenantContext, threat: &ThreatLog) -> AppResult<()> {
        admit_write(context, threat)?;

        let observation = &threat.observation;
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        sqlx::query(
            r#"
            INSERT INTO threat_logs (
                id,
                tenant_id,
                occurred_at,
                source_ip,
                destination_ip,
                user_ref,
                user_agent,
                action,
                resource,
                method,
                status_code,
                anomaly_score,
                risk_score,
                severity,
                is_blocked,
                ai_flagged,
                false_positive,
                raw_data,
                created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(threat.id())
        .bind(context.tenant_id().as_uuid())
        .bind(observation.occurred_at)
        .bind(observation.source_ip.to_string())
        .bind(observation.destination_ip.map(|address| address.to_string()))
        .bind(observation.user_ref.as_deref())
        .bind(observation.user_agent.as_deref())
        .bind(observation.action.as_str())
        .bind(observation.resource.as_str())
        .bind(observation.method.as_deref())
        .bind(observation.status_code.map(i32::from))
        .bind(observation.anomaly_score)
        .bind(observation.risk_score)
        .bind(threat.severity.as_str())
        .bind(observation.is_blocked)
        .bind(observation.ai_flagged)
        .bind(threat.false_positive)
        .bind(Json(&observation.raw_data))
        .bind(threat.created_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            conflict_or_internal(
                error,
                &format!("threat '{}' already exists", threat.id()),
                "insert threat",
            )
        })?;
        commit(transaction).await
    }

    async fn list_threats(
        &self,
        context: &TenantContext,
        query: &ThreatQuery,
    ) -> AppResult<Vec<ThreatLog>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, ThreatRow>(
            r#"
            SELECT
                id, tenant_id, occurred_at, source_ip, destination_ip, user_ref,
                user_agent, action, resource, method, status_code, anomaly_score,
                risk_score, severity, is_blocked, ai_flagged, false_positive,
                raw_data, created_at
            FROM threat_logs
            WHERE tenant_id = $1
                AND occurred_at >= $2
                AND ($3::TEXT IS NULL OR severity = $3)
            ORDER BY occurred_at DESC, id
            LIMIT $4
            OFFSET $5
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(query.since)
        .bind(query.severity.map(|severity| severity.as_str()))
        .bind(i64::from(query.limit))
        .bind(i64::from(query.offset))
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list threats: {error}")))?;
        commit(transaction).await?;

        rows.into_iter().map(ThreatRow::into_threat).collect()
    }

    async fn find_threat(&self, context: &TenantContext, threat_id: Uuid) -> AppResult<ThreatLog> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let row = sqlx::query_as::<_, ThreatRow>(
            r#"
            SELECT
                id, tenant_id, occurred_at, source_ip, destination_ip, user_ref,
                user_agent, action, resource, method, status_code, anomaly_score,
                risk_score, severity, is_blocked, ai_flagged, false_positive,
                raw_data, created_at
            FROM threat_logs
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(threat_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find threat: {error}")))?;
        commit(transaction).await?;

        row.ok_or_else(|| not_found::<ThreatLog>(threat_id))?
            .into_threat()
    }

    async fn save_threat(
        &self,
        context: &TenantContext,
        threat: &ThreatLog,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, threat)?;

        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let updated = sqlx::query(
            r#"
            UPDATE threat_logs
            SET severity = $3,
                is_blocked = $4,
                false_positive = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(threat.id())
        .bind(threat.severity.as_str())
        .bind(threat.observation.is_blocked)
        .bind(threat.false_positive)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save threat: {error}")))?
        .rows_affected();

        if updated == 0 {
            return Err(not_found::<ThreatLog>(threat.id()));
        }

        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }

    async fn count_by_severity(
        &self,
        context: &TenantContext,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SeverityCount>> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT severity, COUNT(*) AS count
            FROM threat_logs
            WHERE tenant_id = $1 AND occurred_at >= $2
            GROUP BY severity
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(since)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count threats: {error}")))?;
        commit(transaction).await?;

        rows.into_iter()
            .map(|(severity, count)| {
                Ok(SeverityCount {
                    severity: severity
                        .parse::<ThreatSeverity>()
                        .map_err(|error| column_error("severity", error))?,
                    count: u64::try_from(count).map_err(|error| column_error("count", error))?,
                })
            })
            .collect()
    }
}
