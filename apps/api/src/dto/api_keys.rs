use sentinel_application::IssuedApiKey;
use sentinel_domain::ApiKey;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::format_timestamp;

/// API representation of an API key. Key material is never included.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/api-key-response.ts"
)]
pub struct ApiKeyResponse {
    pub id: String,
    pub member_id: Option<String>,
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub created_at: String,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(value: ApiKey) -> Self {
        Self {
            id: value.id().to_string(),
            member_id: value.member_id().map(|member_id| member_id.to_string()),
            key_prefix: value.key_prefix().to_owned(),
            name: value.name().to_owned(),
            is_active: value.is_active,
            expires_at: value.expires_at().map(format_timestamp),
            last_used_at: value.last_used_at.map(format_timestamp),
            created_at: format_timestamp(value.created_at()),
        }
    }
}

/// Incoming payload for API key creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-api-key-request.ts"
)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub member_id: Option<String>,
    pub expires_at: Option<String>,
}

/// A freshly issued key. `raw_key` is shown exactly once.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/issued-api-key-response.ts"
)]
pub struct IssuedApiKeyResponse {
    pub api_key: ApiKeyResponse,
    pub raw_key: String,
}

impl From<IssuedApiKey> for IssuedApiKeyResponse {
    fn from(value: IssuedApiKey) -> Self {
        Self {
            api_key: value.api_key.into(),
            raw_key: value.raw_key,
        }
    }
}
