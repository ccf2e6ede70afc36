use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentinel_core::AppError;
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

/// API error payload.
///
/// `code` is stable across releases; `message` is for humans.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/error-response.ts"
)]
pub struct ErrorResponse {
    code: String,
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) | AppError::TenantContextMissing(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AuditWriteConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.0 {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::TenantContextMissing(_) => "tenant_context_missing",
            AppError::Forbidden(_) => "forbidden",
            AppError::AuditWriteConflict(_) => "audit_write_conflict",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Internal(_) => "internal",
        }
    }

    fn body(&self) -> ErrorResponse {
        // Internal details stay in the logs.
        let message = match &self.0 {
            AppError::Internal(_) => "internal error".to_owned(),
            other => other.to_string(),
        };

        ErrorResponse {
            code: self.code().to_owned(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        (status, Json(self.body())).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use sentinel_core::AppError;

    use super::ApiError;

    #[test]
    fn application_errors_map_to_http_statuses() {
        let cases = [
            (AppError::Validation("bad".to_owned()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("gone".to_owned()), StatusCode::NOT_FOUND),
            (AppError::Conflict("taken".to_owned()), StatusCode::CONFLICT),
            (
                AppError::Unauthorized("who".to_owned()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::TenantContextMissing("none".to_owned()),
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::Forbidden("no".to_owned()), StatusCode::FORBIDDEN),
            (
                AppError::AuditWriteConflict("busy".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::RateLimited("slow down".to_owned()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::Internal("boom".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn error_body_carries_a_stable_code() {
        let response = ApiError(AppError::RateLimited("slow down".to_owned())).into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();

        assert_eq!(body["code"], "rate_limited");
        assert_eq!(body["message"], "rate limited: slow down");
    }

    #[tokio::test]
    async fn internal_details_are_not_returned() {
        let response =
            ApiError(AppError::Internal("connection refused at 10.0.0.3".to_owned()))
                .into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();

        assert_eq!(body["code"], "internal");
        assert_eq!(body["message"], "internal error");
    }
}
