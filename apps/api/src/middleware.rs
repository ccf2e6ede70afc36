use std::net::IpAddr;
use std::str::FromStr;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use sentinel_application::ports::GatewayAssertion;
use sentinel_core::{AppError, TenantContext, TenantId};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const MEMBER_ID_HEADER: &str = "x-member-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const MAX_USER_AGENT_LENGTH: usize = 512;
const UNKNOWN_CLIENT: &str = "unknown";

/// Rejects requests that do not carry the gateway's shared secret.
pub async fn require_gateway_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("gateway credential required".to_owned()))?;

    if !secrets_match(presented.trim(), &state.gateway_secret) {
        return Err(AppError::Unauthorized("invalid gateway credential".to_owned()).into());
    }

    Ok(next.run(request).await)
}

/// Resolves the gateway's tenant assertion and attaches the context.
pub async fn resolve_tenant_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let assertion = gateway_assertion(request.headers())?;
    let context = state.tenant_context_service.resolve(assertion).await?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Throttles each forwarded client address.
pub async fn enforce_client_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let client_key = client_metadata(request.headers())
        .0
        .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |address| address.to_string());
    state.rate_limit_service.check_client(&client_key).await?;

    Ok(next.run(request).await)
}

/// Counts the call against the resolved tenant's daily API quota.
pub async fn enforce_api_quota(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let context = request
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or_else(|| AppError::TenantContextMissing("tenant context not resolved".to_owned()))?;
    state.rate_limit_service.enforce_daily_quota(&context).await?;

    Ok(next.run(request).await)
}

pub(crate) fn gateway_assertion(headers: &HeaderMap) -> Result<GatewayAssertion, AppError> {
    let tenant_id = TenantId::from_uuid(required_uuid_header(headers, TENANT_ID_HEADER)?);
    let member_id = required_uuid_header(headers, MEMBER_ID_HEADER)?;
    let (ip_address, user_agent) = client_metadata(headers);

    Ok(GatewayAssertion {
        tenant_id,
        member_id,
        ip_address,
        user_agent,
    })
}

/// Extracts the caller address and user agent forwarded by the gateway.
pub(crate) fn client_metadata(headers: &HeaderMap) -> (Option<IpAddr>, Option<String>) {
    let ip_address = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| IpAddr::from_str(value.trim()).ok());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_USER_AGENT_LENGTH).collect());

    (ip_address, user_agent)
}

fn required_uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid, AppError> {
    let value = headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::TenantContextMissing(format!("{name} header is required")))?;

    Uuid::parse_str(value)
        .map_err(|_| AppError::TenantContextMissing(format!("{name} header is not a valid uuid")))
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
