use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use sentinel_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

use cors::build_cors_layer;

pub fn build_router(app_state: AppState, cors_allowed_origin: &str) -> Result<Router, AppError> {
    let tenant_routes = build_tenant_routes(app_state.clone());

    let gateway_routes = Router::new()
        .route(
            "/api/organizations",
            post(handlers::organizations::onboard_organization_handler),
        )
        .merge(tenant_routes)
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::enforce_client_rate_limit,
        ))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_gateway_secret,
        ));

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(gateway_routes)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(cors_allowed_origin)?)
        .with_state(app_state))
}

fn build_tenant_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/organization",
            get(handlers::organizations::current_organization_handler),
        )
        .route(
            "/api/organization/deactivate",
            post(handlers::organizations::deactivate_organization_handler),
        )
        .route(
            "/api/organization/domain-verification",
            post(handlers::organizations::request_domain_verification_handler),
        )
        .route(
            "/api/organization/domain-verification/confirm",
            post(handlers::organizations::confirm_domain_verification_handler),
        )
        .route(
            "/api/organization/onboarding-status",
            get(handlers::organizations::onboarding_status_handler),
        )
        .route(
            "/api/members",
            get(handlers::members::list_members_handler)
                .post(handlers::members::invite_member_handler),
        )
        .route(
            "/api/members/{member_id}/revoke-sessions",
            post(handlers::members::revoke_member_sessions_handler),
        )
        .route(
            "/api/threats",
            get(handlers::threats::list_threats_handler)
                .post(handlers::threats::ingest_threat_handler),
        )
        .route(
            "/api/threats/summary",
            get(handlers::threats::threat_summary_handler),
        )
        .route(
            "/api/threats/{threat_id}",
            get(handlers::threats::get_threat_handler),
        )
        .route(
            "/api/threats/{threat_id}/false-positive",
            post(handlers::threats::flag_false_positive_handler),
        )
        .route(
            "/api/security-policy",
            get(handlers::security_policy::get_security_policy_handler)
                .put(handlers::security_policy::update_security_policy_handler),
        )
        .route(
            "/api/api-keys",
            get(handlers::api_keys::list_api_keys_handler)
                .post(handlers::api_keys::create_api_key_handler),
        )
        .route(
            "/api/api-keys/{api_key_id}/revoke",
            post(handlers::api_keys::revoke_api_key_handler),
        )
        .route(
            "/api/audit-records",
            get(handlers::audit::list_audit_records_handler),
        )
        .route(
            "/api/audit-records/verify",
            get(handlers::audit::verify_audit_chain_handler),
        )
        .route(
            "/api/audit-records/archive",
            post(handlers::audit::archive_audit_records_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::enforce_api_quota,
        ))
        .route_layer(from_fn_with_state(
            app_state,
            middleware::resolve_tenant_context,
        ))
}
