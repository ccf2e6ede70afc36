use chrono::Utc;
use sentinel_application::ports::{OrganizationOnboarding, OrganizationRepository};
use sentinel_core::{ActorContext, TenantContext, TenantId};
use sentinel_domain::{
    AuditActionType, AuditDraft, Member, MemberRole, Organization, ResourceType, SecurityPolicy,
    SubscriptionTier,
};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::PostgresTenantRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connects to `DATABASE_URL` and migrates it, or skips when unset.
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations in test: {error}");
    }

    Some(pool)
}

/// Returns whether the connected role skips row level security.
pub(crate) async fn role_bypasses_rls(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, bool>(
        "SELECT rolsuper OR rolbypassrls FROM pg_roles WHERE rolname = current_user",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(true)
}

/// Onboards a fresh organization and returns its administrator context.
pub(crate) async fn onboard(pool: &PgPool) -> (TenantContext, Member) {
    let tenant_id = TenantId::new();
    let now = Utc::now();
    let organization = Organization::new(
        tenant_id,
        "Acme",
        format!("{}.example.test", Uuid::new_v4().simple()),
        SubscriptionTier::Professional,
        now,
    )
    .unwrap_or_else(|_| unreachable!());
    let admin = Member::new(tenant_id, "admin@acme.test", "Ada Admin", MemberRole::Admin, now)
        .unwrap_or_else(|_| unreachable!());
    let context = TenantContext::new(tenant_id, ActorContext::member(admin.id(), None, None));

    let record = PostgresTenantRepository::new(pool.clone())
        .create_organization(
            &context,
            OrganizationOnboarding {
                organization,
                admin: admin.clone(),
                policy: SecurityPolicy::default_for(tenant_id, now),
            },
            audit_draft(AuditActionType::OrganizationCreated, ResourceType::Organization),
        )
        .await;
    assert!(record.is_ok());

    (context, admin)
}

/// Builds a payload-free audit draft.
pub(crate) fn audit_draft(action_type: AuditActionType, resource_type: ResourceType) -> AuditDraft {
    AuditDraft::new(action_type, resource_type, None, None, None)
        .unwrap_or_else(|_| unreachable!())
}
