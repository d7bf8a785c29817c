use axum::{
    routing::{get, post},
    Router,
};

use crate::app::graphql;

pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/graphql", post(graphql::graphql_handler))
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
}

/// Router for endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/graphql/playground", get(graphql::graphiql_handler))
}
