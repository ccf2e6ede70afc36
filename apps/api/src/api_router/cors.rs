use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use sentinel_core::AppError;
use tower_http::cors::CorsLayer;

use crate::middleware::{MEMBER_ID_HEADER, TENANT_ID_HEADER};

pub(super) fn build_cors_layer(allowed_origin: &str) -> Result<CorsLayer, AppError> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(allowed_origin).map_err(|error| {
            AppError::Internal(format!("invalid CORS_ALLOWED_ORIGIN: {error}"))
        })?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(TENANT_ID_HEADER),
            HeaderName::from_static(MEMBER_ID_HEADER),
        ]))
}
