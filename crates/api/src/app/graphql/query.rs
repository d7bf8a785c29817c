use async_graphql::{Context, Object, Result as GqlResult, ResultExt};
use uuid::Uuid;

use propdesk_auth::Permission;
use propdesk_documents::DocumentFilter;
use propdesk_infra::jobs::JobStore;

use super::types::{GqlCacheStats, GqlDocument, GqlDocumentType, GqlJobStats, GqlMe, GqlProperty, GqlTenant};
use super::{entity_id, guard};
use crate::app::errors::ServiceError;
use crate::context::{PrincipalContext, TenantContext};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The authenticated caller and its effective permissions.
    async fn me(&self, ctx: &Context<'_>) -> GqlResult<GqlMe> {
        let tenant = ctx.data::<TenantContext>()?;
        let principal = ctx.data::<PrincipalContext>()?;
        let resolved = principal.principal(tenant);

        Ok(GqlMe {
            user_id: principal.user_id().into(),
            tenant_id: tenant.tenant_id().into(),
            roles: principal.roles().iter().map(|r| r.to_string()).collect(),
            permissions: resolved
                .membership
                .permissions
                .iter()
                .map(|p| p.to_string())
                .collect(),
        })
    }

    /// The caller's tenant record.
    async fn tenant(&self, ctx: &Context<'_>) -> GqlResult<Option<GqlTenant>> {
        let (services, tenant_id) = guard(ctx, "tenant", Permission::TENANTS_READ)?;
        let tenant = services.tenants.get(tenant_id).await.extend()?;
        Ok(tenant.map(Into::into))
    }

    async fn property(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<GqlProperty>> {
        let (services, tenant_id) = guard(ctx, "property", Permission::PROPERTIES_READ)?;
        let property = services.properties.get(tenant_id, entity_id(id)).await.extend()?;
        Ok(property.map(Into::into))
    }

    async fn properties(&self, ctx: &Context<'_>) -> GqlResult<Vec<GqlProperty>> {
        let (services, tenant_id) = guard(ctx, "properties", Permission::PROPERTIES_READ)?;
        let properties = services.properties.list(tenant_id).await.extend()?;
        Ok(properties.into_iter().map(Into::into).collect())
    }

    async fn document_type(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<GqlDocumentType>> {
        let (services, tenant_id) = guard(ctx, "documentType", Permission::DOCUMENT_TYPES_READ)?;
        let doc_type = services
            .document_types
            .get(tenant_id, entity_id(id))
            .await
            .extend()?;
        Ok(doc_type.map(Into::into))
    }

    async fn document_types(&self, ctx: &Context<'_>) -> GqlResult<Vec<GqlDocumentType>> {
        let (services, tenant_id) = guard(ctx, "documentTypes", Permission::DOCUMENT_TYPES_READ)?;
        let types = services.document_types.list(tenant_id).await.extend()?;
        Ok(types.into_iter().map(Into::into).collect())
    }

    async fn document(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<GqlDocument>> {
        let (services, tenant_id) = guard(ctx, "document", Permission::DOCUMENTS_READ)?;
        let doc = services.documents.get(tenant_id, entity_id(id)).await.extend()?;
        Ok(doc.map(|d| {
            let url = services.documents.url(&d);
            GqlDocument::new(d, url)
        }))
    }

    /// Documents of the tenant, newest first, optionally filtered.
    async fn documents(
        &self,
        ctx: &Context<'_>,
        document_type_id: Option<Uuid>,
        property_id: Option<Uuid>,
    ) -> GqlResult<Vec<GqlDocument>> {
        let (services, tenant_id) = guard(ctx, "documents", Permission::DOCUMENTS_READ)?;
        let filter = DocumentFilter {
            document_type_id: document_type_id.map(entity_id),
            property_id: property_id.map(entity_id),
        };
        let docs = services.documents.list(tenant_id, filter).await.extend()?;
        Ok(docs
            .into_iter()
            .map(|d| {
                let url = services.documents.url(&d);
                GqlDocument::new(d, url)
            })
            .collect())
    }

    /// Process-wide cache counters.
    async fn cache_stats(&self, ctx: &Context<'_>) -> GqlResult<GqlCacheStats> {
        let (services, _) = guard(ctx, "cacheStats", Permission::OPS_READ)?;
        let cache = services.cache();
        Ok(GqlCacheStats::new(cache.is_enabled(), cache.stats()))
    }

    async fn job_stats(&self, ctx: &Context<'_>) -> GqlResult<GqlJobStats> {
        let (services, tenant_id) = guard(ctx, "jobStats", Permission::OPS_READ)?;
        let stats = services
            .jobs()
            .stats(tenant_id)
            .map_err(ServiceError::from)
            .extend()?;
        Ok(stats.into())
    }
}
