use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::SecurityPolicyRepository;
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AnomalySensitivity, AuditDraft, AuditRecord, SecurityPolicy, SecurityPolicySettings,
    TenantScoped, admit_write, not_found,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::postgres_audit_trail_repository::append_in_transaction;
use crate::postgres_tenant_scope::{
    TenantTransaction, begin_tenant_transaction, column_error, commit, conflict_or_internal,
};

/// PostgreSQL-backed security policy repository.
#[derive(Clone)]
pub struct PostgresSecurityPolicyRepository {
    pool: PgPool,
}

impl PostgresSecurityPolicyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SecurityPolicyRow {
    id: Uuid,
    tenant_id: Uuid,
    alert_threshold_bps: i32,
    block_threshold_bps: i32,
    velocity_threshold: i64,
    anomaly_sensitivity: String,
    enable_auto_block: bool,
    enable_geo_blocking: bool,
    blocked_countries: Vec<String>,
    enable_ip_reputation_check: bool,
    suspicious_activity_alert_email: bool,
    updated_at: DateTime<Utc>,
}

impl SecurityPolicyRow {
    fn into_policy(self) -> AppResult<SecurityPolicy> {
        let settings = SecurityPolicySettings {
            alert_threshold_bps: u16::try_from(self.alert_threshold_bps)
                .map_err(|error| column_error("alert_threshold_bps", error))?,
            block_threshold_bps: u16::try_from(self.block_threshold_bps)
                .map_err(|error| column_error("block_threshold_bps", error))?,
            velocity_threshold: u32::try_from(self.velocity_threshold)
                .map_err(|error| column_error("velocity_threshold", error))?,
            anomaly_sensitivity: self
                .anomaly_sensitivity
                .parse::<AnomalySensitivity>()
                .map_err(|error| column_error("anomaly_sensitivity", error))?,
            enable_auto_block: self.enable_auto_block,
            enable_geo_blocking: self.enable_geo_blocking,
            blocked_countries: self.blocked_countries,
            enable_ip_reputation_check: self.enable_ip_reputation_check,
            suspicious_activity_alert_email: self.suspicious_activity_alert_email,
        };

        Ok(SecurityPolicy::from_parts(
            self.id,
            TenantId::from_uuid(self.tenant_id),
            settings,
            self.updated_at,
        ))
    }
}

/// Inserts a policy inside an open tenant transaction.
pub(crate) async fn insert_security_policy(
    transaction: &mut TenantTransaction,
    policy: &SecurityPolicy,
) -> AppResult<()> {
    let settings = &policy.settings;
    sqlx::query(
        r#"
        INSERT INTO security_policies (
            id,
            tenant_id,
            alert_threshold_bps,
            block_threshold_bps,
            velocity_threshold,
            anomaly_sensitivity,
            enable_auto_block,
            enable_geo_blocking,
            blocked_countries,
            enable_ip_reputation_check,
            suspicious_activity_alert_email,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(policy.id())
    .bind(policy.tenant_id().as_uuid())
    .bind(i32::from(settings.alert_threshold_bps))
    .bind(i32::from(settings.block_threshold_bps))
    .bind(i64::from(settings.velocity_threshold))
    .bind(settings.anomaly_sensitivity.as_str())
    .bind(settings.enable_auto_block)
    .bind(settings.enable_geo_blocking)
    .bind(&settings.blocked_countries)
    .bind(settings.enable_ip_reputation_check)
    .bind(settings.suspicious_activity_alert_email)
    .bind(policy.updated_at)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        conflict_or_internal(
            error,
            "organization already has a security policy",
            "create security policy",
        )
    })?;

    Ok(())
}

#[async_trait]
impl SecurityPolicyRepository for PostgresSecurityPolicyRepository {
    async fn find_security_policy(&self, context: &TenantContext) -> AppResult<SecurityPolicy> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let row = sqlx::query_as::<_, SecurityPolicyRow>(
            r#"
            SELECT
                id,
                tenant_id,
                alert_threshold_bps,
                block_threshold_bps,
                velocity_threshold,
                anomaly_sensitivity,
                enable_auto_block,
                enable_geo_blocking,
                blocked_countries,
                enable_ip_reputation_check,
                suspicious_activity_alert_email,
                updated_at
            FROM security_policies
            WHERE tenant_id = $1
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find security policy: {error}"))
        })?;
        commit(transaction).await?;

        row.ok_or_else(|| {
            AppError::NotFound(format!(
                "security policy for tenant '{}' not found",
                context.tenant_id()
            ))
        })?
        .into_policy()
    }

    async fn save_security_policy(
        &self,
        context: &TenantContext,
        policy: &SecurityPolicy,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, policy)?;

        let settings = &policy.settings;
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let updated = sqlx::query(
            r#"
            UPDATE security_policies
            SET alert_threshold_bps = $3,
                block_threshold_bps = $4,
                velocity_threshold = $5,
                anomaly_sensitivity = $6,
                enable_auto_block = $7,
                enable_geo_blocking = $8,
                blocked_countries = $9,
                enable_ip_reputation_check = $10,
                suspicious_activity_alert_email = $11,
                updated_at = $12
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .bind(policy.id())
        .bind(i32::from(settings.alert_threshold_bps))
        .bind(i32::from(settings.block_threshold_bps))
        .bind(i64::from(settings.velocity_threshold))
        .bind(settings.anomaly_sensitivity.as_str())
        .bind(settings.enable_auto_block)
        .bind(settings.enable_geo_blocking)
        .bind(&settings.blocked_countries)
        .bind(settings.enable_ip_reputation_check)
        .bind(settings.suspicious_activity_alert_email)
        .bind(policy.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to save security policy: {error}"))
        })?
        .rows_affected();

        if updated == 0 {
            return Err(not_found::<SecurityPolicy>(policy.id()));
        }

        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }
}
