//! HTTP API: GraphQL server, auth middleware and service wiring.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
