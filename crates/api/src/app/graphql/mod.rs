//! GraphQL API.
//!
//! Endpoints:
//! - POST /graphql - Execute queries/mutations (bearer token required)
//! - GET /graphql/playground - GraphiQL playground
//!
//! Resolvers authorize first, then call the services. Service errors carry
//! their code in `extensions.code`.

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Result as GqlResult, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::Extension,
    response::{Html, IntoResponse},
};
use uuid::Uuid;

use propdesk_auth::Permission;
use propdesk_core::{EntityId, TenantId};

use crate::app::errors::ServiceError;
use crate::app::services::AppServices;
use crate::authz::{Operation, authorize_operation};
use crate::context::{PrincipalContext, TenantContext};

mod mutation;
mod query;
pub mod types;

pub use mutation::MutationRoot;
pub use query::QueryRoot;

/// The GraphQL schema type.
pub type PropdeskSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

const MAX_QUERY_DEPTH: usize = 12;

/// Create the GraphQL schema.
pub fn create_schema(services: Arc<AppServices>) -> PropdeskSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(services)
        .limit_depth(MAX_QUERY_DEPTH)
        .finish()
}

/// Handler for GraphQL requests; runs behind the auth middleware.
pub async fn graphql_handler(
    Extension(schema): Extension<PropdeskSchema>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let request = req.into_inner().data(tenant).data(principal);
    schema.execute(request).await.into()
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(async_graphql::http::GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Authorize `operation` and return the services plus the caller's tenant.
fn guard<'a>(
    ctx: &Context<'a>,
    operation: &'static str,
    permission: Permission,
) -> GqlResult<(&'a Arc<AppServices>, TenantId)> {
    let tenant = ctx.data::<TenantContext>()?;
    let principal = ctx.data::<PrincipalContext>()?;
    authorize_operation(tenant, principal, &Operation::new(operation, permission))
        .map_err(|e| ServiceError::from(e).extend())?;
    let services = ctx.data::<Arc<AppServices>>()?;
    Ok((services, tenant.tenant_id()))
}

fn entity_id(id: Uuid) -> EntityId {
    EntityId::from_uuid(id)
}
