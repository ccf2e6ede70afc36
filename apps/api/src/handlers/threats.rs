use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use sentinel_application::ThreatListQuery;
use sentinel_core::TenantContext;
use uuid::Uuid;

use crate::dto::{
    FlagFalsePositiveRequest, IngestThreatRequest, SeverityCountResponse, ThreatListParams,
    ThreatResponse, ThreatSummaryParams, ThreatSummaryResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn ingest_threat_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<IngestThreatRequest>,
) -> ApiResult<(StatusCode, Json<ThreatResponse>)> {
    let (observation, severity) = payload.into_observation()?;
    let threat = state
        .threat_service
        .ingest(&context, observation, severity)
        .await?;

    Ok((StatusCode::CREATED, Json(threat.into())))
}

pub async fn list_threats_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Query(params): Query<ThreatListParams>,
) -> ApiResult<Json<Vec<ThreatResponse>>> {
    let threats = state
        .threat_service
        .list(&context, params.into_query()?)
        .await?
        .into_iter()
        .map(ThreatResponse::from)
        .collect();

    Ok(Json(threats))
}

pub async fn threat_summary_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Query(params): Query<ThreatSummaryParams>,
) -> ApiResult<Json<ThreatSummaryResponse>> {
    let days = params.days.unwrap_or(ThreatListQuery::default().days);
    let counts = state
        .threat_service
        .summary(&context, days)
        .await?
        .into_iter()
        .map(SeverityCountResponse::from)
        .collect();

    Ok(Json(ThreatSummaryResponse { days, counts }))
}

pub async fn get_threat_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(threat_id): Path<Uuid>,
) -> ApiResult<Json<ThreatResponse>> {
    let threat = state.threat_service.get(&context, threat_id).await?;
    Ok(Json(threat.into()))
}

pub async fn flag_false_positive_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(threat_id): Path<Uuid>,
    Json(payload): Json<FlagFalsePositiveRequest>,
) -> ApiResult<Json<ThreatResponse>> {
    let threat = state
        .threat_service
        .flag_false_positive(&context, threat_id, payload.reason)
        .await?;

    Ok(Json(threat.into()))
}
