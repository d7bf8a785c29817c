use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    Json,
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use propdesk_auth::Permission;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::authz::{Operation, authorize_operation};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}

/// GET /stream
///
/// Realtime upload notifications (`document.uploaded`, `document.failed`)
/// of the caller's tenant as Server-Sent Events.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let op = Operation::new("stream", Permission::DOCUMENTS_READ);
    if let Err(e) = authorize_operation(&tenant, &principal, &op) {
        return json_error(StatusCode::FORBIDDEN, "FORBIDDEN", e.to_string());
    }

    tenant_sse_stream(&services, tenant).into_response()
}

fn tenant_sse_stream(
    services: &AppServices,
    tenant: TenantContext,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let tenant_id = tenant.tenant_id();
    let rx = services.realtime().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receivers skip what they missed.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
