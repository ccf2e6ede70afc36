use axum::Json;
use axum::extract::{Extension, State};
use sentinel_core::TenantContext;
use sentinel_domain::SecurityPolicySettings;

use crate::dto::{SecurityPolicyResponse, UpdateSecurityPolicyRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_security_policy_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<SecurityPolicyResponse>> {
    let policy = state.security_policy_service.get(&context).await?;
    Ok(Json(policy.into()))
}

pub async fn update_security_policy_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<UpdateSecurityPolicyRequest>,
) -> ApiResult<Json<SecurityPolicyResponse>> {
    let settings = SecurityPolicySettings::try_from(payload)?;
    let policy = state
        .security_policy_service
        .update(&context, settings)
        .await?;

    Ok(Json(policy.into()))
}
