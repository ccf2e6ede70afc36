use async_trait::async_trait;
use sentinel_core::{AppResult, TenantContext};
use sentinel_domain::{ApiKey, AuditDraft, AuditRecord};
use uuid::Uuid;

/// Repository port for API keys.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Lists keys of the active tenant, newest first.
    async fn list_api_keys(&self, context: &TenantContext) -> AppResult<Vec<ApiKey>>;

    /// Returns one key of the active tenant.
    async fn find_api_key(&self, context: &TenantContext, api_key_id: Uuid) -> AppResult<ApiKey>;

    /// Persists a new key and its audit record in one transaction.
    async fn create_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;

    /// Persists key changes and their audit record in one transaction.
    async fn save_api_key(
        &self,
        context: &TenantContext,
        api_key: &ApiKey,
        audit: AuditDraft,
    ) -> AppResult<AuditRecord>;
}
