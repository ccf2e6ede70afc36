use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{ActorContext, AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    ApiKey, AuditDraft, AuditRecord, ChainTail, Member, MemberRole, Organization, SecurityPolicy,
    SubscriptionTier, TenantScoped, ThreatLog, not_found,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ports::{
    ApiKeyRepository, ArchiveBatch, AttemptInfo, AuditRecordQuery, AuditTrailRepository,
    MemberRepository, OrganizationOnboarding, OrganizationRepository, RateLimitRepository,
    RevokedSessions, SecurityPolicyRepository, SeverityCount, TenantDirectory, TenantMembership,
    ThreatQuery, ThreatRepository,
};

/// Single fake backing every port, filtering by tenant on each access.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub(crate) organizations: Mutex<Vec<Organization>>,
    pub(crate) members: Mutex<Vec<Member>>,
    pub(crate) threats: Mutex<Vec<ThreatLog>>,
    pub(crate) policies: Mutex<Vec<SecurityPolicy>>,
    pub(crate) api_keys: Mutex<Vec<ApiKey>>,
    pub(crate) records: Mutex<Vec<AuditRecord>>,
    pub(crate) archived: Mutex<Vec<AuditRecord>>,
    pub(crate) heads: Mutex<HashMap<TenantId, ChainTail>>,
    pub(crate) pending_conflicts: Mutex<u32>,
    pub(crate) windows: Mutex<HashMap<String, AttemptInfo>>,
    pub(crate) rate_limits_unavailable: Mutex<bool>,
}

impl FakeStore {
    /// Seeds an organization with one member of the given role.
    pub(crate) async fn seed_tenant(&self, role: MemberRole) -> (TenantContext, Member) {
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let organization = Organization::new(
            tenant_id,
            "Acme",
            format!("{}.example.com", Uuid::new_v4().simple()),
            SubscriptionTier::Professional,
            now,
        )
        .unwrap_or_else(|_| unreachable!());
        let member = Member::new(tenant_id, "owner@acme.test", "Owner", role, now)
            .unwrap_or_else(|_| unreachable!());

        self.organizations.lock().await.push(organization);
        self.policies
            .lock()
            .await
            .push(SecurityPolicy::default_for(tenant_id, now));
        self.members.lock().await.push(member.clone());

        let context =
            TenantContext::new(tenant_id, ActorContext::member(member.id(), None, None));
        (context, member)
    }

    /// Returns the live records of one tenant in chain order.
    pub(crate) async fn chain_of(&self, tenant_id: TenantId) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.tenant_id() == tenant_id)
            .cloned()
            .collect()
    }

    async fn append_record(
        &self,
        context: &TenantContext,
        draft: AuditDraft,
    ) -> AppResult<AuditRecord> {
        {
            let mut pending = self.pending_conflicts.lock().await;
            if *pending > 0 {
                *pending -= 1;
                return Err(AppError::AuditWriteConflict(
                    "simulated tail race".to_owned(),
                ));
            }
        }

        let archived_tail = self
            .archived
            .lock()
            .await
            .iter()
            .filter(|record| record.tenant_id() == context.tenant_id())
            .max_by_key(|record| record.sequence())
            .map(ChainTail::of);
        let mut records = self.records.lock().await;
        let tail = records
            .iter()
            .filter(|record| record.tenant_id() == context.tenant_id())
            .max_by_key(|record| record.sequence())
            .map(ChainTail::of)
            .or(archived_tail)
            .unwrap_or_else(ChainTail::genesis);

        let record = AuditRecord::seal(context, draft, &tail, Utc::now());
        self.heads
            .lock()
            .await
            .insert(context.tenant_id(), ChainTail::of(&record));
        records.push(record.clone());
        Ok(record)
    }
}

fn find_scoped<T: TenantScoped + Clone>(
    rows: &[T],
    context: &TenantContext,
    row_id: Uuid,
) -> AppResult<T> {
    rows.iter()
        .find(|row| row.tenant_id() == context.tenant_id() && row.row_id() == row_id)
        .cloned()
        .ok_or_else(|| not_found::<T>(row_id))
}

fn replace_scoped<T: TenantScoped + Clone>(
    rows: &mut [T],
    context: &TenantContext,
    row: &T,
) -> AppResult<()> {
    sentinel_domain::admit_write(context, row)?;
    let slot = rows
        .iter_mut()
        .find(|stored| stored.tenant_id() == context.tenant_id() && stored.row_id() == row.row_id())
        .ok_or_else(|| not_found::<T>(row.row_id()))?;
    *slot = row.clone();
    Ok(())
}

#[async_trait]
impl TenantDirectory for FakeStore {
    async fn find_membership(
        &self,
        tenant_id: TenantId,
        member_id: Uuid,
    ) -> AppResult<Option<TenantMembership>> {
        let organization_active = self
            .organizations
            .lock()
            .await
            .iter()
            .find(|organization| organization.id() == tenant_id)
            .map(Organization::is_active);
        let member_active = self
            .members
            .lock()
            .await
            .iter()
            .find(|member| member.tenant_id() == tenant_id && member.id() == member_id)
            .map(|member| member.is_active);

        Ok(organization_active.zip(member_active).map(
            |(organization_active, member_active)| TenantMembership {
                organization_active,
                member_active,
            },
        ))
    }

    async fn list_active_tenant_ids(&self) -> AppResult<Vec<TenantId>> {
        Ok(self
            .organizations
            .lock()
            .await
            .iter()
            .filter(|organization| organization.is_active())
            .map(Organization::id)
            .collect())
    }
}

#[async_trait]
impl OrganizationRepository for FakeStore {
    async fn create_organization(
        &self,
        context: &TenantContext,
        onboarding: OrganizationOnboarding,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        if self
            .organizations
            .lock()
            .await
            .iter()
            .any(|organization| organization.domain() == onboarding.organization.domain())
        {
            return Err(AppError::Conflict("domain already registered".to_owned()));
        }

        let record = self.append_record(context, audit).await?;
        self.organizations
            .lock()
            .await
            .push(onboarding.organization);
        self.members.lock().await.push(onboarding.admin);
        self.policies.lock().await.push(onboarding.policy);
        Ok(record)
    }

    async fn find_organization(&self, context: &TenantContext) -> AppResult<Organization> {
        find_scoped(
            &self.organizations.lock().await,
            context,
            context.tenant_id().as_uuid(),
        )
    }

    async fn save_organization(
        &self,
        context: &TenantContext,
        organization: &Organization,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, organization)?;
        let record = self.append_record(context, audit).await?;
        replace_scoped(&mut self.organizations.lock().await, context, organization)?;
        Ok(record)
    }
}

#[async_trait]
impl MemberRepository for FakeStore {
    async fn list_members(&self, context: &TenantContext) -> AppResult<Vec<Member>> {
        Ok(self
            .members
            .lock()
            .await
            .iter()
            .filter(|member| member.tenant_id() == context.tenant_id())
            .cloned()
            .collect())
    }

    async fn find_member(&self, context: &TenantContext, member_id: Uuid) -> AppResult<Member> {
        find_scoped(&self.members.lock().await, context, member_id)
    }

    async fn create_member(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, member)?;
        let mut members = self.members.lock().await;
        if members.iter().any(|stored| {
            stored.tenant_id() == member.tenant_id() && stored.email() == member.email()
        }) {
            return Err(AppError::Conflict("member email already exists".to_owned()));
        }
        let organization = find_scoped(
            &self.organizations.lock().await,
            context,
            context.tenant_id().as_uuid(),
        )?;
        let seats = members
            .iter()
            .filter(|stored| stored.tenant_id() == context.tenant_id())
            .count();
        organization.quotas().admit_member(seats as u64)?;

        let record = self.append_record(context, audit).await?;
        members.push(member.clone());
        Ok(record)
    }

    async fn revoke_member_sessions(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<RevokedSessions> {
        sentinel_domain::admit_write(context, member)?;
        let mut members = self.members.lock().await;
        let mut api_keys = self.api_keys.lock().await;
        find_scoped(&members, context, member.id())?;

        let owned: Vec<usize> = api_keys
            .iter()
            .enumerate()
            .filter(|(_, api_key)| {
                api_key.tenant_id() == context.tenant_id()
                    && api_key.member_id() == Some(member.id())
                    && api_key.is_active
            })
            .map(|(index, _)| index)
            .collect();
        let revoked_api_keys = owned.len() as u64;
        let audit = audit.with_new_value(
            "revoked_api_keys",
            i64::try_from(revoked_api_keys).unwrap_or(i64::MAX),
        )?;

        let audit_record = self.append_record(context, audit).await?;
        replace_scoped(&mut members, context, member)?;
        for index in owned {
            api_keys[index].is_active = false;
        }
        Ok(RevokedSessions {
            revoked_api_keys,
            audit_record,
        })
    }
}

#[async_trait]
impl ThreatRepository for FakeStore {
    async fn insert_threat(&self, context: &TenantContext, threat: &ThreatLog) -> AppResult<()> {
        sentinel_domain::admit_write(context, threat)?;
        self.threats.lock().await.push(threat.clone());
        Ok(())
    }

    async fn list_threats(
        &self,
        context: &TenantContext,
        query: &ThreatQuery,
    ) -> AppResult<Vec<ThreatLog>> {
        let mut threats: Vec<ThreatLog> = self
            .threats
            .lock()
            .await
            .iter()
            .filter(|threat| threat.tenant_id() == context.tenant_id())
            .filter(|threat| threat.observation.occurred_at >= query.since)
            .filter(|threat| query.severity.is_none_or(|severity| threat.severity == severity))
            .cloned()
            .collect();
        threats.sort_by(|left, right| right.observation.occurred_at.cmp(&left.observation.occurred_at));
        Ok(threats
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn find_threat(&self, context: &TenantContext, threat_id: Uuid) -> AppResult<ThreatLog> {
        find_scoped(&self.threats.lock().await, context, threat_id)
    }

    async fn save_threat(
        &self,
        context: &TenantContext,
        threat: &ThreatLog,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, threat)?;
        let record = self.append_record(context, audit).await?;
        replace_scoped(&mut self.threats.lock().await, context, threat)?;
        Ok(record)
    }

    async fn count_by_severity(
        &self,
        context: &TenantContext,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SeverityCount>> {
        let threats = self.threats.lock().await;
        Ok(sentinel_domain::ThreatSeverity::all()
            .iter()
            .map(|severity| SeverityCount {
                severity: *severity,
                count: threats
                    .iter()
                    .filter(|threat| {
                        threat.tenant_id() == context.tenant_id()
                            && threat.severity == *severity
                            && threat.observation.occurred_at >= since
                    })
                    .count() as u64,
            })
            .filter(|bucket| bucket.count > 0)
            .collect())
    }
}

#[async_trait]
impl SecurityPolicyRepository for FakeStore {
    async fn find_security_policy(&self, context: &TenantContext) -> AppResult<SecurityPolicy> {
        self.policies
            .lock()
            .await
            .iter()
            .find(|policy| policy.tenant_id() == context.tenant_id())
            .cloned()
            .ok_or_else(|| AppError::NotFound("security policy not found".to_owned()))
    }

    async fn save_security_policy(
        &self,
        context: &TenantContext,
        policy: &SecurityPolicy,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, policy)?;
        let record = self.append_record(context, audit).await?;
        replace_scoped(&mut self.policies.lock().await, context, policy)?;
        Ok(record)
    }
}

#[async_trait]
impl ApiKeyRepository for FakeStore {
    async fn list_api_keys(&self, context: &TenantContext) -> AppResult<Vec<ApiKey>> {
        Ok(self
            .api_keys
            .lock()
            .await
            .iter()
            .filter(|api_key| api_key.tenant_id() == context.tenant_id())
            .cloned()
            .collect())
    }

    async fn find_api_key(&self, context: &TenantContext, api_key_id: Uuid) -> AppResult<ApiKey> {
        find_scoped(&self.api_keys.lock().await, context, api_key_id)
    }

    async fn create_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, api_key)?;
        let record = self.append_record(context, audit).await?;
        self.api_keys.lock().await.push(api_key.clone());
        Ok(record)
    }

    async fn save_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        sentinel_domain::admit_write(context, api_key)?;
        let record = self.append_record(context, audit).await?;
        replace_scoped(&mut self.api_keys.lock().await, context, api_key)?;
        Ok(record)
    }
}

#[async_trait]
impl AuditTrailRepository for FakeStore {
    async fn append(&self, context: &TenantContext, draft: AuditDraft) -> AppResult<AuditRecord> {
        self.append_record(context, draft).await
    }

    async fn list_records(
        &self,
        context: &TenantContext,
        query: &AuditRecordQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut records = self.chain_of(context.tenant_id()).await;
        records.retain(|record| {
            query
                .action_type
                .is_none_or(|action_type| record.action_type() == action_type)
                && query
                    .actor_subject
                    .as_deref()
                    .is_none_or(|subject| record.actor().subject() == subject)
        });
        records.reverse();
        Ok(records
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn read_chain_head(&self, context: &TenantContext) -> AppResult<Option<ChainTail>> {
        Ok(self.heads.lock().await.get(&context.tenant_id()).cloned())
    }

    async fn read_chain(
        &self,
        context: &TenantContext,
        after_sequence: u64,
        limit: u32,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .archived
            .lock()
            .await
            .iter()
            .filter(|record| record.tenant_id() == context.tenant_id())
            .cloned()
            .collect();
        records.extend(self.chain_of(context.tenant_id()).await);
        records.retain(|record| record.sequence() > after_sequence);
        records.sort_by_key(AuditRecord::sequence);
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn archive_before(
        &self,
        context: &TenantContext,
        cutoff: DateTime<Utc>,
    ) -> AppResult<ArchiveBatch> {
        let mut records = self.records.lock().await;
        let (expired, kept): (Vec<AuditRecord>, Vec<AuditRecord>) =
            records.drain(..).partition(|record| {
                record.tenant_id() == context.tenant_id() && record.recorded_at() < cutoff
            });
        *records = kept;

        let batch = ArchiveBatch {
            archived_count: expired.len() as u64,
            archived_through_sequence: expired.iter().map(AuditRecord::sequence).max(),
        };
        self.archived.lock().await.extend(expired);
        Ok(batch)
    }
}

#[async_trait]
impl RateLimitRepository for FakeStore {
    async fn record_attempt(&self, key: &str, window_seconds: i64) -> AppResult<AttemptInfo> {
        if *self.rate_limits_unavailable.lock().await {
            return Err(AppError::Internal("rate limit store unavailable".to_owned()));
        }

        let now = Utc::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_owned()).or_insert(AttemptInfo {
            attempt_count: 0,
            window_started_at: now,
        });
        if window.window_started_at + chrono::Duration::seconds(window_seconds) < now {
            window.attempt_count = 0;
            window.window_started_at = now;
        }
        window.attempt_count += 1;

        Ok(window.clone())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut windows = self.windows.lock().await;
        let count = windows.len();
        windows.retain(|_, window| window.window_started_at >= before);
        Ok((count - windows.len()) as u64)
    }
}
