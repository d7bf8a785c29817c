//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services/`: stores, cache, bucket, job queue and per-area services
//! - `graphql/`: schema, resolvers and GraphQL types
//! - `routes/`: plain HTTP routes (health, whoami, SSE stream)
//! - `errors.rs`: `ServiceError` and its client-facing codes

use std::sync::Arc;

use axum::{Extension, Router};

use propdesk_infra::config::AppConfig;
use propdesk_infra::jobs::JobExecutorHandle;

use crate::middleware;

pub mod errors;
pub mod graphql;
pub mod routes;
pub mod services;

use services::AppServices;

/// The router plus the background upload workers it relies on.
///
/// Dropping `workers` stops the executor; keep it alive while serving.
pub struct Application {
    pub router: Router,
    pub services: Arc<AppServices>,
    pub workers: JobExecutorHandle,
}

/// Build the full application (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Application> {
    let services = Arc::new(services::build_services(config).await?);
    let workers = services.spawn_upload_workers(config);
    let router = router(services.clone(), config.jwt_secret.as_bytes());

    Ok(Application {
        router,
        services,
        workers,
    })
}

/// Assemble the HTTP router over already-built services.
pub fn router(services: Arc<AppServices>, jwt_secret: &[u8]) -> Router {
    let jwt = Arc::new(propdesk_auth::Hs256JwtValidator::new(jwt_secret));
    let auth_state = middleware::AuthState {
        jwt,
        tenants: services.tenants.clone(),
    };
    let schema = graphql::create_schema(services.clone());

    // Protected routes: require auth + an active tenant.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(Extension(schema))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
}
