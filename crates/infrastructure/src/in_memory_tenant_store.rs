use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_application::ports::{
    ApiKeyRepository, ArchiveBatch, AuditRecordQuery, AuditTrailRepository, MemberRepository,
    OrganizationOnboarding, OrganizationRepository, RevokedSessions, SecurityPolicyRepository,
    SeverityCount, TenantDirectory, TenantMembership, ThreatQuery, ThreatRepository,
};
use sentinel_core::{AppError, AppResult, TenantContext, TenantId};
use sentinel_domain::{
    ApiKey, AuditDraft, AuditRecord, ChainTail, Member, Organization, SecurityPolicy, ThreatLog,
    ThreatSeverity, admit_write,
};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

mod chain;
mod partition;

use chain::TenantChain;
pub use partition::TenantPartition;

/// Directory entry kept outside the tenant partitions so that domain
/// uniqueness and the active tenant list need no tenant context.
#[derive(Debug, Clone)]
struct TenantRegistration {
    domain: String,
    is_active: bool,
}

/// Process-local store implementing every repository port.
///
/// Rows live in per-entity [`TenantPartition`]s. Each tenant has its own
/// chain mutex, taken before any partition lock, so an audited mutation and
/// its audit record become visible together.
#[derive(Default)]
pub struct InMemoryTenantStore {
    registry: RwLock<HashMap<TenantId, TenantRegistration>>,
    organizations: RwLock<TenantPartition<Organization>>,
    members: RwLock<TenantPartition<Member>>,
    policies: RwLock<TenantPartition<SecurityPolicy>>,
    threats: RwLock<TenantPartition<ThreatLog>>,
    api_keys: RwLock<TenantPartition<ApiKey>>,
    chains: RwLock<HashMap<TenantId, Arc<Mutex<TenantChain>>>>,
}

impl InMemoryTenantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn chain(&self, tenant_id: TenantId) -> Arc<Mutex<TenantChain>> {
        if let Some(chain) = self.chains.read().await.get(&tenant_id) {
            return Arc::clone(chain);
        }

        Arc::clone(self.chains.write().await.entry(tenant_id).or_default())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantStore {
    async fn find_membership(
        &self,
        tenant_id: TenantId,
        member_id: Uuid,
    ) -> AppResult<Option<TenantMembership>> {
        let Some(registration) = self.registry.read().await.get(&tenant_id).cloned() else {
            return Ok(None);
        };

        let lookup = TenantContext::system(tenant_id, "tenant-directory");
        let member = match self.members.read().await.get(&lookup, member_id) {
            Ok(member) => member,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };

        Ok(Some(TenantMembership {
            organization_active: registration.is_active,
            member_active: member.is_active,
        }))
    }

    async fn list_active_tenant_ids(&self) -> AppResult<Vec<TenantId>> {
        let mut tenant_ids: Vec<TenantId> = self
            .registry
            .read()
            .await
            .iter()
            .filter(|(_, registration)| registration.is_active)
            .map(|(tenant_id, _)| *tenant_id)
            .collect();
        tenant_ids.sort_by_key(|tenant_id| tenant_id.as_uuid());
        Ok(tenant_ids)
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryTenantStore {
    async fn create_organization(
        &self,
        context: &TenantContext,
        onboarding: OrganizationOnboarding,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let OrganizationOnboarding {
            organization,
            admin,
            policy,
        } = onboarding;
        admit_write(context, &organization)?;
        admit_write(context, &admin)?;
        admit_write(context, &policy)?;

        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let mut registry = self.registry.write().await;
        if registry.contains_key(&context.tenant_id()) {
            return Err(AppError::Conflict(format!(
                "organization '{}' already exists",
                context.tenant_id()
            )));
        }
        if registry
            .values()
            .any(|registration| registration.domain == organization.domain())
        {
            return Err(AppError::Conflict(format!(
                "domain '{}' is already registered",
                organization.domain()
            )));
        }

        let mut organizations = self.organizations.write().await;
        let mut members = self.members.write().await;
        let mut policies = self.policies.write().await;
        organizations.ensure_insertable(context, &organization)?;
        members.ensure_insertable(context, &admin)?;
        policies.ensure_insertable(context, &policy)?;

        registry.insert(
            context.tenant_id(),
            TenantRegistration {
                domain: organization.domain().to_owned(),
                is_active: organization.is_active(),
            },
        );
        organizations.insert(context, organization)?;
        members.insert(context, admin)?;
        policies.insert(context, policy)?;

        Ok(chain.append(context, audit, Utc::now()))
    }

    async fn find_organization(&self, context: &TenantContext) -> AppResult<Organization> {
        self.organizations
            .read()
            .await
            .get(context, context.tenant_id().as_uuid())
    }

    async fn save_organization(
        &self,
        context: &TenantContext,
        organization: &Organization,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let mut registry = self.registry.write().await;
        let mut organizations = self.organizations.write().await;
        organizations.replace(context, organization.clone())?;
        if let Some(registration) = registry.get_mut(&context.tenant_id()) {
            registration.is_active = organization.is_active();
        }

        Ok(chain.append(context, audit, Utc::now()))
    }
}

#[async_trait]
impl MemberRepository for InMemoryTenantStore {
    async fn list_members(&self, context: &TenantContext) -> AppResult<Vec<Member>> {
        let mut members: Vec<Member> = self.members.read().await.iter(context).cloned().collect();
        members.sort_by(|left, right| left.email().cmp(right.email()));
        Ok(members)
    }

    async fn find_member(&self, context: &TenantContext, member_id: Uuid) -> AppResult<Member> {
        self.members.read().await.get(context, member_id)
    }

    async fn create_member(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let organization = self
            .organizations
            .read()
            .await
            .get(context, context.tenant_id().as_uuid())?;
        let mut members = self.members.write().await;
        if members
            .iter(context)
            .any(|stored| stored.email() == member.email())
        {
            return Err(AppError::Conflict(format!(
                "member '{}' already exists",
                member.email()
            )));
        }
        organization
            .quotas()
            .admit_member(members.count(context) as u64)?;
        members.insert(context, member.clone())?;

        Ok(chain.append(context, audit, Utc::now()))
    }

    async fn revoke_member_sessions(
        &self,
        context: &TenantContext,
        member: &Member,
        audit: AuditDraft,
    ) -> AppResult<RevokedSessions> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let mut members = self.members.write().await;
        let mut api_keys = self.api_keys.write().await;
        members.ensure_replaceable(context, member)?;
        let revoked_api_keys = api_keys
            .iter(context)
            .filter(|api_key| api_key.is_active && api_key.member_id() == Some(member.id()))
            .count() as u64;
        let audit = audit.with_new_value(
            "revoked_api_keys",
            i64::try_from(revoked_api_keys).unwrap_or(i64::MAX),
        )?;

        members.replace(context, member.clone())?;
        api_keys.update_where(
            context,
            |api_key| api_key.is_active && api_key.member_id() == Some(member.id()),
            |api_key| api_key.is_active = false,
        );
        debug!(
            tenant_id = %context.tenant_id(),
            member_id = %member.id(),
            revoked_api_keys,
            "revoked member sessions"
        );

        Ok(RevokedSessions {
            revoked_api_keys,
            audit_record: chain.append(context, audit, Utc::now()),
        })
    }
}

#[async_trait]
impl ThreatRepository for InMemoryTenantStore {
    async fn insert_threat(&self, context: &TenantContext, threat: &ThreatLog) -> AppResult<()> {
        self.threats.write().await.insert(context, threat.clone())
    }

    async fn list_threats(
        &self,
        context: &TenantContext,
        query: &ThreatQuery,
    ) -> AppResult<Vec<ThreatLog>> {
        let mut threats: Vec<ThreatLog> = self
            .threats
            .read()
            .await
            .iter(context)
            .filter(|threat| threat.observation.occurred_at >= query.since)
            .filter(|threat| query.severity.is_none_or(|severity| threat.severity == severity))
            .cloned()
            .collect();
        threats.sort_by(|left, right| {
            right
                .observation
                .occurred_at
                .cmp(&left.observation.occurred_at)
                .then_with(|| left.id().cmp(&right.id()))
        });

        Ok(threats
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn find_threat(&self, context: &TenantContext, threat_id: Uuid) -> AppResult<ThreatLog> {
        self.threats.read().await.get(context, threat_id)
    }

    async fn save_threat(
        &self,
        context: &TenantContext,
        threat: &ThreatLog,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        self.threats
            .write()
            .await
            .replace(context, threat.clone())?;

        Ok(chain.append(context, audit, Utc::now()))
    }

    async fn count_by_severity(
        &self,
        context: &TenantContext,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SeverityCount>> {
        let threats = self.threats.read().await;
        Ok(ThreatSeverity::all()
            .iter()
            .map(|severity| SeverityCount {
                severity: *severity,
                count: threats
                    .iter(context)
                    .filter(|threat| {
                        threat.severity == *severity && threat.observation.occurred_at >= since
                    })
                    .count() as u64,
            })
            .filter(|bucket| bucket.count > 0)
            .collect())
    }
}

#[async_trait]
impl SecurityPolicyRepository for InMemoryTenantStore {
    async fn find_security_policy(&self, context: &TenantContext) -> AppResult<SecurityPolicy> {
        self.policies
            .read()
            .await
            .iter(context)
            .next()
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "security policy for tenant '{}' not found",
                    context.tenant_id()
                ))
            })
    }

    async fn save_security_policy(
        &self,
        context: &TenantContext,
        policy: &SecurityPolicy,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        self.policies
            .write()
            .await
            .replace(context, policy.clone())?;

        Ok(chain.append(context, audit, Utc::now()))
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryTenantStore {
    async fn list_api_keys(&self, context: &TenantContext) -> AppResult<Vec<ApiKey>> {
        let mut api_keys: Vec<ApiKey> =
            self.api_keys.read().await.iter(context).cloned().collect();
        api_keys.sort_by(|left, right| {
            right
                .created_at()
                .cmp(&left.created_at())
                .then_with(|| left.id().cmp(&right.id()))
        });
        Ok(api_keys)
    }

    async fn find_api_key(&self, context: &TenantContext, api_key_id: Uuid) -> AppResult<ApiKey> {
        self.api_keys.read().await.get(context, api_key_id)
    }

    async fn create_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        let members = self.members.read().await;
        if let Some(member_id) = api_key.member_id() {
            members.get(context, member_id)?;
        }
        self.api_keys
            .write()
            .await
            .insert(context, api_key.clone())?;

        Ok(chain.append(context, audit, Utc::now()))
    }

    async fn save_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let mut chain = chain.lock().await;
        self.api_keys
            .write()
            .await
            .replace(context, api_key.clone())?;

        Ok(chain.append(context, audit, Utc::now()))
    }
}

#[async_trait]
impl AuditTrailRepository for InMemoryTenantStore {
    async fn append(&self, context: &TenantContext, draft: AuditDraft) -> AppResult<AuditRecord> {
        let chain = self.chain(context.tenant_id()).await;
        let record = chain.lock().await.append(context, draft, Utc::now());
        debug!(
            tenant_id = %context.tenant_id(),
            sequence = record.sequence(),
            "appended audit record"
        );
        Ok(record)
    }

    async fn list_records(
        &self,
        context: &TenantContext,
        query: &AuditRecordQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let chain = self.chain(context.tenant_id()).await;
        let records = chain.lock().await.list(query);
        Ok(records)
    }

    async fn read_chain_head(&self, context: &TenantContext) -> AppResult<Option<ChainTail>> {
        let chain = self.chain(context.tenant_id()).await;
        let head = chain.lock().await.head();
        Ok(head)
    }

    async fn read_chain(
        &self,
        context: &TenantContext,
        after_sequence: u64,
        limit: u32,
    ) -> AppResult<Vec<AuditRecord>> {
        let chain = self.chain(context.tenant_id()).await;
        let records = chain.lock().await.read(after_sequence, limit);
        Ok(records)
    }

    async fn archive_before(
        &self,
        context: &TenantContext,
        cutoff: DateTime<Utc>,
    ) -> AppResult<ArchiveBatch> {
        let chain = self.chain(context.tenant_id()).await;
        let batch = chain.lock().await.archive_before(cutoff);
        Ok(batch)
    }
}

#[cfg(test)]
mod tests;
