use chrono::Utc;
use sentinel_application::ports::{ApiKeyRepository, MemberRepository};
use sentinel_core::AppError;
use sentinel_domain::{ApiKey, AuditActionType, AuditValue, Member, MemberRole, ResourceType};
use tokio::task::JoinSet;

use super::PostgresMemberRepository;
use crate::PostgresApiKeyRepository;
use crate::postgres_tenant_scope::{begin_tenant_transaction, commit};
use crate::postgres_test_support::{audit_draft, onboard, test_pool};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invites_never_exceed_the_seat_limit() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let (context, _) = onboard(&pool).await;
    let mut transaction = begin_tenant_transaction(&pool, context.tenant_id())
        .await
        .unwrap_or_else(|_| unreachable!());
    let resized = sqlx::query("UPDATE organizations SET max_users = 3 WHERE id = $1")
        .bind(context.tenant_id().as_uuid())
        .execute(&mut *transaction)
        .await;
    assert!(resized.is_ok());
    assert!(commit(transaction).await.is_ok());

    let repository = PostgresMemberRepository::new(pool.clone());
    let mut tasks = JoinSet::new();
    for index in 0..12 {
        let repository = repository.clone();
        let context = context.clone();
        tasks.spawn(async move {
            let member = Member::new(
                context.tenant_id(),
                format!("seat{index}@acme.test").as_str(),
                "Seat Holder",
                MemberRole::Viewer,
                Utc::now(),
            )
            .unwrap_or_else(|_| unreachable!());
            repository
                .create_member(
                    &context,
                    &member,
                    audit_draft(AuditActionType::MemberInvited, ResourceType::Member),
                )
                .await
        });
    }

    let mut admitted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => admitted += 1,
            Ok(Err(AppError::Conflict(_))) => {}
            other => panic!("unexpected invite outcome: {other:?}"),
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(
        repository.list_members(&context).await.unwrap_or_default().len(),
        3
    );
}

#[tokio::test]
async fn revocation_deactivates_every_key_of_the_member() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let (context, admin) = onboard(&pool).await;
    let members = PostgresMemberRepository::new(pool.clone());
    let api_keys = PostgresApiKeyRepository::new(pool.clone());
    let now = Utc::now();
    for raw_key in [
        "10000000000000000000000000000001",
        "10000000000000000000000000000002",
    ] {
        let api_key =
            ApiKey::issue(context.tenant_id(), Some(admin.id()), "ci", raw_key, None, now)
                .unwrap_or_else(|_| unreachable!());
        let created = api_keys
            .create_api_key(
                &context,
                &api_key,
                audit_draft(AuditActionType::ApiKeyCreated, ResourceType::ApiKey),
            )
            .await;
        assert!(created.is_ok());
    }

    let mut revoked_member = admin.clone();
    revoked_member.sessions_revoked_at = Some(now);
    let revoked = members
        .revoke_member_sessions(
            &context,
            &revoked_member,
            audit_draft(AuditActionType::SessionRevoked, ResourceType::Member),
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(revoked.revoked_api_keys, 2);
    assert_eq!(
        revoked
            .audit_record
            .new_values()
            .and_then(|values| values.get("revoked_api_keys")),
        Some(&AuditValue::Integer(2))
    );
    let keys = api_keys.list_api_keys(&context).await.unwrap_or_default();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| !key.is_active));
}
