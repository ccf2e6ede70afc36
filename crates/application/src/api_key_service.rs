use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sentinel_core::{AppError, AppResult, TenantContext};
use sentinel_domain::{ApiKey, AuditActionType, AuditDraft, AuditValues, ResourceType};
use uuid::Uuid;

use crate::ports::{ApiKeyRepository, MemberRepository};
use crate::{AccessService, AuditRetryPolicy};

const RAW_KEY_PREFIX: &str = "ssk_";

/// Input for issuing an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateApiKeyInput {
    /// Display name.
    pub name: String,
    /// Optional owning member.
    pub member_id: Option<Uuid>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly issued key. The raw key is never stored and is only
/// available here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedApiKey {
    /// Stored key metadata.
    pub api_key: ApiKey,
    /// Raw key material.
    pub raw_key: String,
}

/// Application service for API keys.
#[derive(Clone)]
pub struct ApiKeyService {
    repository: Arc<dyn ApiKeyRepository>,
    members: Arc<dyn MemberRepository>,
    access: AccessService,
    retry: AuditRetryPolicy,
}

impl ApiKeyService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ApiKeyRepository>,
        members: Arc<dyn MemberRepository>,
        access: AccessService,
        retry: AuditRetryPolicy,
    ) -> Self {
        Self {
            repository,
            members,
            access,
            retry,
        }
    }

    /// Lists keys of the active tenant.
    pub async fn list(&self, context: &TenantContext) -> AppResult<Vec<ApiKey>> {
        self.access.require_admin(context).await?;
        self.repository.list_api_keys(context).await
    }

    /// Issues a key and records its creation.
    pub async fn create(
        &self,
        context: &TenantContext,
        input: CreateApiKeyInput,
    ) -> AppResult<IssuedApiKey> {
        self.access.require_admin(context).await?;

        if let Some(member_id) = input.member_id {
            self.members.find_member(context, member_id).await?;
        }

        let raw_key = generate_raw_key()?;
        let api_key = ApiKey::issue(
            context.tenant_id(),
            input.member_id,
            input.name.as_str(),
            raw_key.as_str(),
            input.expires_at,
            Utc::now(),
        )?;

        let draft = AuditDraft::new(
            AuditActionType::ApiKeyCreated,
            ResourceType::ApiKey,
            Some(api_key.id().to_string()),
            None,
            Some(
                AuditValues::new()
                    .with("name", api_key.name())
                    .with("key_prefix", api_key.key_prefix())
                    .with(
                        "member_id",
                        api_key.member_id().map(|member_id| member_id.to_string()),
                    )
                    .with(
                        "expires_at",
                        api_key
                            .expires_at()
                            .map(|expires_at| expires_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
                    )
                    .with("is_active", api_key.is_active),
            ),
        )?;

        self.retry
            .run(context, "api_key_create", || {
                self.repository
                    .create_api_key(context, &api_key, draft.clone())
            })
            .await?;

        Ok(IssuedApiKey { api_key, raw_key })
    }

    /// Revokes a key and records the revocation.
    pub async fn revoke(&self, context: &TenantContext, api_key_id: Uuid) -> AppResult<ApiKey> {
        self.access.require_admin(context).await?;

        let mut api_key = self.repository.find_api_key(context, api_key_id).await?;
        api_key.revoke()?;

        let draft = AuditDraft::new(
            AuditActionType::ApiKeyRevoked,
            ResourceType::ApiKey,
            Some(api_key_id.to_string()),
            Some(AuditValues::new().with("is_active", true)),
            Some(
                AuditValues::new()
                    .with("is_active", false)
                    .with("key_prefix", api_key.key_prefix()),
            ),
        )?;

        self.retry
            .run(context, "api_key_revoke", || {
                self.repository.save_api_key(context, &api_key, draft.clone())
            })
            .await?;

        Ok(api_key)
    }
}

fn generate_raw_key() -> AppResult<String> {
    let mut bytes = [0_u8; 32];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate api key: {error}")))?;

    Ok(format!("{RAW_KEY_PREFIX}{}", hex::encode(bytes)))
}
