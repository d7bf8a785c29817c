use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use propdesk_auth::JwtValidator;

use crate::app::errors::{ServiceError, json_error};
use crate::app::services::TenantService;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub tenants: TenantService,
}

/// Verify the bearer token and resolve the caller's tenant.
///
/// 401 for missing or invalid tokens; 403 for unknown or inactive tenants.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(msg) => return json_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg),
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            return json_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "invalid or expired token");
        }
    };

    if let Err(e) = state.tenants.resolve(claims.tenant_id).await {
        return match e {
            ServiceError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            other => {
                tracing::error!(tenant_id = %claims.tenant_id, error = ?other, "tenant lookup failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "tenant lookup failed")
            }
        };
    }

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;

    let header = header.to_str().map_err(|_| "malformed Authorization header")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("expected a Bearer token")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(token)
}
