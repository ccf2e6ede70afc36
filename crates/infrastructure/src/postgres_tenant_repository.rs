use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{
    OrganizationOnboarding, OrganizationRepository, TenantDirectory, TenantMembership,
};
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    AuditDraft, AuditRecord, Organization, OrganizationQuotas, PendingDomainVerification,
    SubscriptionTier, VerificationMethod, admit_write, not_found,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::postgres_audit_trail_repository::append_in_transaction;
use crate::postgres_member_repository::insert_member;
use crate::postgres_security_policy_repository::insert_security_policy;
use crate::postgres_tenant_scope::{
    TenantTransaction, begin_tenant_transaction, column_error, commit, conflict_or_internal,
};

/// PostgreSQL-backed organization registry and tenant directory.
#[derive(Clone)]
pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    domain: String,
    subscription_tier: String,
    is_active: bool,
    max_users: i64,
    max_api_calls_per_day: i64,
    enable_mfa: bool,
    enable_sso: bool,
    retention_days: i32,
    verification_method: Option<String>,
    verification_token_hash: Option<String>,
    verification_requested_at: Option<DateTime<Utc>>,
    verification_expires_at: Option<DateTime<Utc>>,
    domain_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl OrganizationRow {
    fn into_organization(self) -> AppResult<Organization> {
        let quotas = OrganizationQuotas {
            max_users: u32::try_from(self.max_users)
                .map_err(|error| column_error("max_users", error))?,
            max_api_calls_per_day: u32::try_from(self.max_api_calls_per_day)
                .map_err(|error| column_error("max_api_calls_per_day", error))?,
            enable_mfa: self.enable_mfa,
            enable_sso: self.enable_sso,
            retention_days: u16::try_from(self.retention_days)
                .map_err(|error| column_error("retention_days", error))?,
        };

        let pending_verification = match (
            self.verification_method,
            self.verification_token_hash,
            self.verification_requested_at,
            self.verification_expires_at,
        ) {
            (Some(method), Some(token_hash), Some(requested_at), Some(expires_at)) => {
                Some(PendingDomainVerification {
                    method: method
                        .parse::<VerificationMethod>()
                        .map_err(|error| column_error("verification_method", error))?,
                    token_hash,
                    requested_at,
                    expires_at,
                })
            }
            _ => None,
        };

        Ok(Organization::from_parts(
            TenantId::from_uuid(self.id),
            self.name,
            self.domain,
            self.subscription_tier
                .parse::<SubscriptionTier>()
                .map_err(|error| column_error("subscription_tier", error))?,
            self.is_active,
            quotas,
            self.created_at,
        )?
        .with_domain_ownership(pending_verification, self.domain_verified_at))
    }
}

/// Reads the active tenant's organization and holds its row lock until the
/// transaction ends.
pub(crate) async fn lock_organization(
    transaction: &mut TenantTransaction,
    tenant_id: TenantId,
) -> AppResult<Organization> {
    let row = sqlx::query_as::<_, OrganizationRow>(
        r#"
        SELECT
            id,
            name,
            domain,
            subscription_tier,
            is_active,
            max_users,
            max_api_calls_per_day,
            enable_mfa,
            enable_sso,
            retention_days,
            verification_method,
            verification_token_hash,
            verification_requested_at,
            verification_expires_at,
            domain_verified_at,
            created_at
        FROM organizations
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to lock organization: {error}")))?;

    row.ok_or_else(|| not_found::<Organization>(tenant_id.as_uuid()))?
        .into_organization()
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    organization_active: bool,
    member_active: bool,
}

#[async_trait]
impl TenantDirectory for PostgresTenantRepository {
    async fn find_membership(
        &self,
        tenant_id: TenantId,
        member_id: Uuid,
    ) -> AppResult<Option<TenantMembership>> {
        let mut transaction = begin_tenant_transaction(&self.pool, tenant_id).await?;
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT
                organizations.is_active AS organization_active,
                members.is_active AS member_active
            FROM organizations
            INNER JOIN members ON members.tenant_id = organizations.id
            WHERE organizations.id = $1
                AND members.id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(member_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to resolve tenant membership: {error}"))
        })?;
        commit(transaction).await?;

        Ok(row.map(|row| TenantMembership {
            organization_active: row.organization_active,
            member_active: row.member_active,
        }))
    }

    async fn list_active_tenant_ids(&self) -> AppResult<Vec<TenantId>> {
        let tenant_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT tenant_id
            FROM tenant_registry
            WHERE is_active
            ORDER BY tenant_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active tenants: {error}")))?;

        Ok(tenant_ids.into_iter().map(TenantId::from_uuid).collect())
    }
}

#[async_trait]
impl OrganizationRepository for PostgresTenantRepository {
    async fn create_organization(
        &self,
        context: &TenantContext,
        onboarding: OrganizationOnboarding,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, &onboarding.organization)?;
        admit_write(context, &onboarding.admin)?;
        admit_write(context, &onboarding.policy)?;

        let organization = &onboarding.organization;
        let quotas = organization.quotas();
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (
                id,
                name,
                domain,
                subscription_tier,
                is_active,
                max_users,
                max_api_calls_per_day,
                enable_mfa,
                enable_sso,
                retention_days,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(organization.id().as_uuid())
        .bind(organization.name())
        .bind(organization.domain())
        .bind(organization.subscription_tier().as_str())
        .bind(organization.is_active())
        .bind(i64::from(quotas.max_users))
        .bind(i64::from(quotas.max_api_calls_per_day))
        .bind(quotas.enable_mfa)
        .bind(quotas.enable_sso)
        .bind(i32::from(quotas.retention_days))
        .bind(organization.created_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            conflict_or_internal(
                error,
                &format!("domain '{}' is already registered", organization.domain()),
                "create organization",
            )
        })?;

        insert_member(&mut transaction, &onboarding.admin).await?;
        insert_security_policy(&mut transaction, &onboarding.policy).await?;
        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }

    async fn find_organization(&self, context: &TenantContext) -> AppResult<Organization> {
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT
                id,
                name,
                domain,
                subscription_tier,
                is_active,
                max_users,
                max_api_calls_per_day,
                enable_mfa,
                enable_sso,
                retention_days,
                verification_method,
                verification_token_hash,
                verification_requested_at,
                verification_expires_at,
                domain_verified_at,
                created_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(context.tenant_id().as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find organization: {error}")))?;
        commit(transaction).await?;

        row.ok_or_else(|| not_found::<Organization>(context.tenant_id().as_uuid()))?
            .into_organization()
    }

    async fn save_organization(
        &self,
        context: &TenantContext,
        organization: &Organization,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        admit_write(context, organization)?;

        let quotas = organization.quotas();
        let pending = organization.pending_verification();
        let mut transaction = begin_tenant_transaction(&self.pool, context.tenant_id()).await?;
        let updated = sqlx::query(
            r#"
            UPDATE organizations
            SET name = $2,
                subscription_tier = $3,
                is_active = $4,
                max_users = $5,
                max_api_calls_per_day = $6,
                enable_mfa = $7,
                enable_sso = $8,
                retention_days = $9,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(organization.id().as_uuid())
        .bind(organization.name())
        .bind(organization.subscription_tier().as_str())
        .bind(organization.is_active())
        .bind(i64::from(quotas.max_users))
        .bind(i64::from(quotas.max_api_calls_per_day))
        .bind(quotas.enable_mfa)
        .bind(quotas.enable_sso)
        .bind(i32::from(quotas.retention_days))
        .bind(pending.map(|pending| pending.method.as_str()))
        .bind(pending.map(|pending| pending.token_hash.as_str()))
        .bind(pending.map(|pending| pending.requested_at))
        .bind(pending.map(|pending| pending.expires_at))
        .bind(organization.domain_verified_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save organization: {error}")))?
        .rows_affected();

        if updated == 0 {
            return Err(not_found::<Organization>(organization.id().as_uuid()));
        }

        let record = append_in_transaction(&mut transaction, context, audit).await?;
        commit(transaction).await?;

        Ok(record)
    }
}
