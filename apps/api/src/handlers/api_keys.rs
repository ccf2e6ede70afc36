use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use sentinel_application::CreateApiKeyInput;
use sentinel_core::{AppError, TenantContext};
use uuid::Uuid;

use crate::dto::{ApiKeyResponse, CreateApiKeyRequest, IssuedApiKeyResponse, parse_timestamp};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<Vec<ApiKeyResponse>>> {
    let api_keys = state
        .api_key_service
        .list(&context)
        .await?
        .into_iter()
        .map(ApiKeyResponse::from)
        .collect();

    Ok(Json(api_keys))
}

pub async fn create_api_key_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<IssuedApiKeyResponse>)> {
    let member_id = payload
        .member_id
        .as_deref()
        .map(|value| {
            Uuid::parse_str(value.trim())
                .map_err(|_| AppError::Validation(format!("invalid member_id '{value}'")))
        })
        .transpose()?;
    let expires_at = payload
        .expires_at
        .as_deref()
        .map(|value| parse_timestamp("expires_at", value))
        .transpose()?;

    let issued = state
        .api_key_service
        .create(
            &context,
            CreateApiKeyInput {
                name: payload.name,
                member_id,
                expires_at,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(issued.into())))
}

pub async fn revoke_api_key_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(api_key_id): Path<Uuid>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let api_key = state.api_key_service.revoke(&context, api_key_id).await?;
    Ok(Json(api_key.into()))
}
