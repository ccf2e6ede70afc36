use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use sentinel_application::InviteMemberInput;
use sentinel_core::TenantContext;
use sentinel_domain::MemberRole;
use uuid::Uuid;

use crate::dto::{
    InviteMemberRequest, MemberResponse, RevokeSessionsRequest, SessionRevocationResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_members_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let members = state
        .member_service
        .list(&context)
        .await?
        .into_iter()
        .map(MemberResponse::from)
        .collect();

    Ok(Json(members))
}

pub async fn invite_member_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<InviteMemberRequest>,
) -> ApiResult<(StatusCode, Json<MemberResponse>)> {
    let member = state
        .member_service
        .invite(
            &context,
            InviteMemberInput {
                email: payload.email,
                full_name: payload.full_name,
                role: MemberRole::from_str(payload.role.as_str())?,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(member.into())))
}

pub async fn revoke_member_sessions_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(member_id): Path<Uuid>,
    Json(payload): Json<RevokeSessionsRequest>,
) -> ApiResult<Json<SessionRevocationResponse>> {
    let revocation = state
        .member_service
        .revoke_sessions(&context, member_id, payload.reason)
        .await?;

    Ok(Json(revocation.into()))
}
