use axum::Json;
use axum::extract::{Extension, Query, State};
use sentinel_core::TenantContext;

use crate::dto::{
    ArchiveOutcomeResponse, AuditRecordListParams, AuditRecordResponse, VerificationResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_audit_records_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Query(params): Query<AuditRecordListParams>,
) -> ApiResult<Json<Vec<AuditRecordResponse>>> {
    let records = state
        .audit_trail_service
        .list_records(&context, params.into_query()?)
        .await?
        .into_iter()
        .map(AuditRecordResponse::from)
        .collect();

    Ok(Json(records))
}

pub async fn verify_audit_chain_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<VerificationResponse>> {
    let result = state.audit_trail_service.verify_chain(&context).await?;
    Ok(Json(result.into()))
}

pub async fn archive_audit_records_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<ArchiveOutcomeResponse>> {
    let outcome = state.audit_trail_service.archive_expired(&context).await?;
    Ok(Json(outcome.into()))
}
