use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use sentinel_application::OnboardOrganizationInput;
use sentinel_core::TenantContext;
use sentinel_domain::{SubscriptionTier, VerificationMethod};

use crate::dto::{
    ConfirmDomainVerificationRequest, DomainChallengeResponse, DomainVerificationRequest,
    OnboardOrganizationRequest, OnboardOrganizationResponse, OnboardingStatusResponse,
    OrganizationResponse,
};
use crate::error::ApiResult;
use crate::middleware::client_metadata;
use crate::state::AppState;

pub async fn onboard_organization_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OnboardOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<OnboardOrganizationResponse>)> {
    let (ip_address, user_agent) = client_metadata(&headers);
    let onboarded = state
        .organization_service
        .onboard(OnboardOrganizationInput {
            name: payload.name,
            domain: payload.domain,
            subscription_tier: SubscriptionTier::from_str(payload.subscription_tier.as_str())?,
            admin_email: payload.admin_email,
            admin_full_name: payload.admin_full_name,
            ip_address,
            user_agent,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(onboarded.into())))
}

pub async fn current_organization_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<OrganizationResponse>> {
    let organization = state.organization_service.current(&context).await?;
    Ok(Json(organization.into()))
}

pub async fn deactivate_organization_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<OrganizationResponse>> {
    let organization = state.organization_service.deactivate(&context).await?;
    Ok(Json(organization.into()))
}

pub async fn request_domain_verification_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<DomainVerificationRequest>,
) -> ApiResult<(StatusCode, Json<DomainChallengeResponse>)> {
    let method = VerificationMethod::from_str(payload.method.trim())?;
    let challenge = state
        .domain_verification_service
        .request(&context, method)
        .await?;

    Ok((StatusCode::CREATED, Json(challenge.into())))
}

pub async fn confirm_domain_verification_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(payload): Json<ConfirmDomainVerificationRequest>,
) -> ApiResult<Json<OrganizationResponse>> {
    let organization = state
        .domain_verification_service
        .confirm(&context, payload.token.as_str())
        .await?;
    Ok(Json(organization.into()))
}

pub async fn onboarding_status_handler(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<OnboardingStatusResponse>> {
    let status = state
        .domain_verification_service
        .onboarding_status(&context)
        .await?;
    Ok(Json(status.into()))
}
