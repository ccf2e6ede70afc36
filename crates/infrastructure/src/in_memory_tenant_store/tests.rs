use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{Duration, Utc};
use sentinel_application::ports::{
    ApiKeyRepository, AuditRecordQuery, AuditTrailRepository, MemberRepository,
    OrganizationRepository, TenantDirectory, ThreatRepository,
};
use sentinel_application::{
    AccessService, AuditRetryPolicy, AuditTrailService, InviteMemberInput, MemberService,
    OnboardOrganizationInput, OnboardedOrganization, OrganizationService, ThreatListQuery,
    ThreatService,
};
use sentinel_core::{ActorContext, AppError, TenantContext};
use sentinel_domain::{
    ApiKey, AuditActionType, AuditDraft, AuditRecord, DivergenceReason, MemberRole, ResourceType,
    SubscriptionTier, ThreatObservation, VerificationResult,
};
use serde_json::json;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::InMemoryTenantStore;

struct Harness {
    store: Arc<InMemoryTenantStore>,
    organizations: OrganizationService,
    members: MemberService,
    threats: ThreatService,
    audit: AuditTrailService,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryTenantStore::new());
    let access = AccessService::new(store.clone());
    let retry = AuditRetryPolicy::default();

    Harness {
        organizations: OrganizationService::new(store.clone(), access.clone(), retry),
        members: MemberService::new(store.clone(), store.clone(), access.clone(), retry),
        threats: ThreatService::new(store.clone(), access.clone(), retry),
        audit: AuditTrailService::new(store.clone(), store.clone(), access, retry)
            .with_verify_page_size(2),
        store,
    }
}

async fn onboard(harness: &Harness, domain: &str) -> (TenantContext, OnboardedOrganization) {
    onboard_on(harness, domain, SubscriptionTier::Professional).await
}

async fn onboard_on(
    harness: &Harness,
    domain: &str,
    subscription_tier: SubscriptionTier,
) -> (TenantContext, OnboardedOrganization) {
    let onboarded = harness
        .organizations
        .onboard(OnboardOrganizationInput {
            name: "Acme".to_owned(),
            domain: domain.to_owned(),
            subscription_tier,
            admin_email: format!("admin@{domain}"),
            admin_full_name: "Ada Admin".to_owned(),
            ip_address: None,
            user_agent: None,
        })
        .await
        .unwrap_or_else(|_| unreachable!());
    let context = TenantContext::new(
        onboarded.organization.id(),
        ActorContext::member(
            onboarded.admin.id(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))),
            Some("tests".to_owned()),
        ),
    );

    (context, onboarded)
}

fn policy_draft() -> AuditDraft {
    AuditDraft::new(
        AuditActionType::SecurityPolicyUpdated,
        ResourceType::SecurityPolicy,
        None,
        None,
        None,
    )
    .unwrap_or_else(|_| unreachable!())
}

fn observation(minutes_ago: i64) -> ThreatObservation {
    ThreatObservation {
        occurred_at: Utc::now() - Duration::minutes(minutes_ago),
        source_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
        destination_ip: None,
        user_ref: None,
        user_agent: Some("curl/8.0".to_owned()),
        action: "login".to_owned(),
        resource: "/api/session".to_owned(),
        method: Some("POST".to_owned()),
        status_code: Some(401),
        anomaly_score: 0.4,
        risk_score: 0.8,
        is_blocked: true,
        ai_flagged: false,
        raw_data: json!({ "attempts": 12 }),
    }
}

fn rebuilt(record: &AuditRecord, resource_id: Option<String>) -> AuditRecord {
    AuditRecord::from_parts(
        record.id(),
        record.tenant_id(),
        record.sequence(),
        record.action_type(),
        record.resource_type(),
        resource_id,
        record.old_values().cloned(),
        record.new_values().cloned(),
        record.actor().clone(),
        record.recorded_at(),
        record.content_hash().to_owned(),
        record.previous_hash().to_owned(),
    )
}

#[tokio::test]
async fn onboarding_opens_a_chain_that_verifies() {
    let harness = harness();
    let (context, onboarded) = onboard(&harness, "acme.test").await;

    assert_eq!(onboarded.audit_record.sequence(), 1);
    assert_eq!(
        onboarded.audit_record.action_type(),
        AuditActionType::OrganizationCreated
    );

    let first = harness.audit.append(&context, policy_draft()).await;
    let second = harness.audit.append(&context, policy_draft()).await;
    assert!(first.is_ok());
    assert!(second.is_ok());

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    match verification {
        VerificationResult::Verified {
            records_checked,
            tail_sequence,
            ..
        } => {
            assert_eq!(records_checked, 3);
            assert_eq!(tail_sequence, 3);
        }
        VerificationResult::Diverged(divergence) => {
            panic!("chain should verify, diverged at {}", divergence.sequence)
        }
    }
}

#[tokio::test]
async fn duplicate_domain_is_rejected_without_creating_a_tenant() {
    let harness = harness();
    let _ = onboard(&harness, "dup.test").await;

    let second = harness
        .organizations
        .onboard(OnboardOrganizationInput {
            name: "Other".to_owned(),
            domain: "dup.test".to_owned(),
            subscription_tier: SubscriptionTier::Starter,
            admin_email: "admin@other.test".to_owned(),
            admin_full_name: "Other Admin".to_owned(),
            ip_address: None,
            user_agent: None,
        })
        .await;

    assert!(matches!(second, Err(AppError::Conflict(_))));
    let active = harness
        .store
        .list_active_tenant_ids()
        .await
        .unwrap_or_default();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn tampered_record_is_reported_as_hash_mismatch() {
    let harness = harness();
    let (context, _) = onboard(&harness, "tamper.test").await;
    for _ in 0..2 {
        assert!(harness.audit.append(&context, policy_draft()).await.is_ok());
    }

    {
        let chain = harness.store.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let tampered = rebuilt(&chain.live[1], Some("forged".to_owned()));
        chain.live[1] = tampered;
    }

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    let VerificationResult::Diverged(divergence) = verification else {
        panic!("tampered chain must not verify");
    };
    assert_eq!(divergence.sequence, 2);
    assert_eq!(divergence.reason, DivergenceReason::HashMismatch);
}

#[tokio::test]
async fn removed_record_is_reported_as_missing_predecessor() {
    let harness = harness();
    let (context, _) = onboard(&harness, "gap.test").await;
    for _ in 0..3 {
        assert!(harness.audit.append(&context, policy_draft()).await.is_ok());
    }

    {
        let chain = harness.store.chain(context.tenant_id()).await;
        let _removed = chain.lock().await.live.remove(2);
    }

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    let VerificationResult::Diverged(divergence) = verification else {
        panic!("chain with a gap must not verify");
    };
    assert_eq!(divergence.sequence, 4);
    assert_eq!(divergence.reason, DivergenceReason::MissingPredecessor);
}

#[tokio::test]
async fn tenants_cannot_read_or_write_each_others_rows() {
    let harness = harness();
    let (left, _) = onboard(&harness, "left.test").await;
    let (right, _) = onboard(&harness, "right.test").await;

    let threat = harness
        .threats
        .ingest(&left, observation(5), None)
        .await
        .unwrap_or_else(|_| unreachable!());

    let foreign_read = harness.threats.get(&right, threat.id()).await;
    assert!(matches!(foreign_read, Err(AppError::NotFound(_))));

    let foreign_list = harness
        .threats
        .list(&right, ThreatListQuery::default())
        .await
        .unwrap_or_default();
    assert!(foreign_list.is_empty());

    let foreign_flag = harness
        .threats
        .flag_false_positive(&right, threat.id(), None)
        .await;
    assert!(matches!(foreign_flag, Err(AppError::NotFound(_))));

    let foreign_save = harness.store.save_threat(&right, &threat, policy_draft()).await;
    assert!(matches!(foreign_save, Err(AppError::NotFound(_))));

    let right_records = harness
        .store
        .list_records(&right, &AuditRecordQuery::default())
        .await
        .unwrap_or_default();
    assert_eq!(right_records.len(), 1);
    assert!(
        right_records
            .iter()
            .all(|record| record.tenant_id() == right.tenant_id())
    );
}

#[tokio::test]
async fn failed_mutation_leaves_no_audit_record() {
    let harness = harness();
    let (context, onboarded) = onboard(&harness, "atomic.test").await;

    let duplicate = harness
        .members
        .invite(
            &context,
            InviteMemberInput {
                email: onboarded.admin.email().to_owned(),
                full_name: "Second Ada".to_owned(),
                role: MemberRole::Viewer,
            },
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let records = harness
        .store
        .list_records(&context, &AuditRecordQuery::default())
        .await
        .unwrap_or_default();
    assert_eq!(records.len(), 1);
    assert_eq!(
        harness.store.list_members(&context).await.unwrap_or_default().len(),
        1
    );
}

#[tokio::test]
async fn losing_the_newest_records_is_missing_predecessor() {
    let harness = harness();
    let (context, _) = onboard(&harness, "tail.test").await;
    for _ in 0..3 {
        assert!(harness.audit.append(&context, policy_draft()).await.is_ok());
    }

    let survivor = {
        let chain = harness.store.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let _ = chain.live.pop();
        let _ = chain.live.pop();
        chain.live.last().map(AuditRecord::id)
    };

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    let VerificationResult::Diverged(divergence) = verification else {
        panic!("chain missing its tail must not verify");
    };
    assert_eq!(Some(divergence.record_id), survivor);
    assert_eq!(divergence.sequence, 4);
    assert_eq!(divergence.reason, DivergenceReason::MissingPredecessor);
}

#[tokio::test]
async fn losing_every_record_is_missing_predecessor() {
    let harness = harness();
    let (context, _) = onboard(&harness, "wiped.test").await;
    assert!(harness.audit.append(&context, policy_draft()).await.is_ok());

    {
        let chain = harness.store.chain(context.tenant_id()).await;
        chain.lock().await.live.clear();
    }

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        verification,
        VerificationResult::Diverged(ref divergence)
            if divergence.reason == DivergenceReason::MissingPredecessor
                && divergence.sequence == 2
                && divergence.record_id.is_nil()
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invites_never_exceed_the_seat_limit() {
    let harness = harness();
    let (context, _) = onboard_on(&harness, "seats.test", SubscriptionTier::Starter).await;

    let mut tasks = JoinSet::new();
    for index in 0..40 {
        let members = harness.members.clone();
        let context = context.clone();
        tasks.spawn(async move {
            members
                .invite(
                    &context,
                    InviteMemberInput {
                        email: format!("seat{index}@seats.test"),
                        full_name: "Seat Holder".to_owned(),
                        role: MemberRole::Viewer,
                    },
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

    assert_eq!(admitted, 9);
    assert_eq!(
        harness.store.list_members(&context).await.unwrap_or_default().len(),
        10
    );
    let invited = harness
        .store
        .list_records(
            &context,
            &AuditRecordQuery {
                action_type: Some(AuditActionType::MemberInvited),
                ..AuditRecordQuery::default()
            },
        )
        .await
        .unwrap_or_default();
    assert_eq!(invited.len(), 9);
}

#[tokio::test]
async fn revocation_deactivates_keys_by_owner_inside_the_write() {
    let harness = harness();
    let (context, onboarded) = onboard(&harness, "revoke.test").await;
    let now = Utc::now();
    for raw_key in [
        "20000000000000000000000000000001",
        "20000000000000000000000000000002",
    ] {
        let api_key = ApiKey::issue(
            context.tenant_id(),
            Some(onboarded.admin.id()),
            "ci",
            raw_key,
            None,
            now,
        )
        .unwrap_or_else(|_| unreachable!());
        let created = harness
            .store
            .create_api_key(
                &context,
                &api_key,
                AuditDraft::new(
                    AuditActionType::ApiKeyCreated,
                    ResourceType::ApiKey,
                    None,
                    None,
                    None,
                )
                .unwrap_or_else(|_| unreachable!()),
            )
            .await;
        assert!(created.is_ok());
    }

    let revocation = harness
        .members
        .revoke_sessions(&context, onboarded.admin.id(), None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(revocation.revoked_api_keys, 2);
    let keys = harness.store.list_api_keys(&context).await.unwrap_or_default();
    assert!(keys.iter().all(|key| !key.is_active));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_form_one_linear_chain() {
    let harness = harness();
    let (context, _) = onboard(&harness, "busy.test").await;

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let store = harness.store.clone();
        let context = context.clone();
        tasks.spawn(async move { store.append(&context, policy_draft()).await });
    }

    let mut appended = 0;
    while let Some(joined) = tasks.join_next().await {
        assert!(matches!(joined, Ok(Ok(_))));
        appended += 1;
    }
    assert_eq!(appended, 50);

    let chain = harness
        .store
        .read_chain(&context, 0, 100)
        .await
        .unwrap_or_default();
    let sequences: Vec<u64> = chain.iter().map(AuditRecord::sequence).collect();
    assert_eq!(sequences, (1..=51).collect::<Vec<u64>>());
    assert!(
        chain
            .windows(2)
            .all(|pair| pair[1].previous_hash() == pair[0].content_hash())
    );

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(verification.is_verified());
}

#[tokio::test]
async fn archived_records_stay_verifiable() {
    let harness = harness();
    let (context, _) = onboard(&harness, "archive.test").await;
    for _ in 0..3 {
        assert!(harness.audit.append(&context, policy_draft()).await.is_ok());
    }

    let batch = harness
        .store
        .archive_before(&context, Utc::now() + Duration::seconds(1))
        .await
        .unwrap_or_default();
    assert_eq!(batch.archived_count, 4);
    assert_eq!(batch.archived_through_sequence, Some(4));

    let live = harness
        .store
        .list_records(&context, &AuditRecordQuery::default())
        .await
        .unwrap_or_default();
    assert!(live.is_empty());

    let next = harness
        .audit
        .append(&context, policy_draft())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(next.sequence(), 5);

    let verification = harness
        .audit
        .verify_chain(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(verification.is_verified());
}

#[tokio::test]
async fn deactivated_tenant_leaves_the_directory() {
    let harness = harness();
    let (context, onboarded) = onboard(&harness, "leaving.test").await;

    let membership = harness
        .store
        .find_membership(context.tenant_id(), onboarded.admin.id())
        .await
        .unwrap_or_default();
    assert!(membership.is_some_and(|membership| membership.organization_active));

    assert!(harness.organizations.deactivate(&context).await.is_ok());

    let active = harness
        .store
        .list_active_tenant_ids()
        .await
        .unwrap_or_default();
    assert!(active.is_empty());
    let organization = harness
        .store
        .find_organization(&context)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(!organization.is_active());

    let foreign_member = harness
        .store
        .find_membership(context.tenant_id(), Uuid::new_v4())
        .await
        .unwrap_or_default();
    assert!(foreign_member.is_none());
}
