use async_graphql::{Context, Object, Result as GqlResult, ResultExt};
use uuid::Uuid;

use propdesk_auth::Permission;
use propdesk_documents::NewDocumentType;
use propdesk_properties::NewProperty;

use super::types::{
    CreateDocumentTypeInput, CreatePropertyInput, GqlDocument, GqlDocumentType, GqlProperty, GqlTenant,
    UpdateDocumentTypeInput, UpdatePropertyInput, UpdateTenantInput, UploadDocumentInput,
};
use super::{entity_id, guard};
use crate::app::errors::ServiceError;
use crate::app::services::UploadRequest;

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn update_tenant(&self, ctx: &Context<'_>, input: UpdateTenantInput) -> GqlResult<GqlTenant> {
        let (services, tenant_id) = guard(ctx, "updateTenant", Permission::TENANTS_MANAGE)?;
        let tenant = services.tenants.update(tenant_id, input.into()).await.extend()?;
        Ok(tenant.into())
    }

    async fn create_property(&self, ctx: &Context<'_>, input: CreatePropertyInput) -> GqlResult<GqlProperty> {
        let (services, tenant_id) = guard(ctx, "createProperty", Permission::PROPERTIES_WRITE)?;
        let new = NewProperty::new(&input.name, input.address.as_deref(), input.unit_count)
            .map_err(ServiceError::from)
            .extend()?;
        let property = services.properties.create(tenant_id, new).await.extend()?;
        Ok(property.into())
    }

    async fn update_property(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdatePropertyInput,
    ) -> GqlResult<GqlProperty> {
        let (services, tenant_id) = guard(ctx, "updateProperty", Permission::PROPERTIES_WRITE)?;
        let property = services
            .properties
            .update(tenant_id, entity_id(id), input.into())
            .await
            .extend()?;
        Ok(property.into())
    }

    /// Fails with `CONFLICT` while documents are attached to the property.
    async fn delete_property(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<bool> {
        let (services, tenant_id) = guard(ctx, "deleteProperty", Permission::PROPERTIES_WRITE)?;
        services.properties.delete(tenant_id, entity_id(id)).await.extend()?;
        Ok(true)
    }

    async fn create_document_type(
        &self,
        ctx: &Context<'_>,
        input: CreateDocumentTypeInput,
    ) -> GqlResult<GqlDocumentType> {
        let (services, tenant_id) = guard(ctx, "createDocumentType", Permission::DOCUMENT_TYPES_WRITE)?;
        let new = NewDocumentType::new(
            &input.name,
            input.description.as_deref(),
            input.allowed_content_types.unwrap_or_default(),
            input.max_size_bytes,
        )
        .map_err(ServiceError::from)
        .extend()?;
        let doc_type = services.document_types.create(tenant_id, new).await.extend()?;
        Ok(doc_type.into())
    }

    async fn update_document_type(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdateDocumentTypeInput,
    ) -> GqlResult<GqlDocumentType> {
        let (services, tenant_id) = guard(ctx, "updateDocumentType", Permission::DOCUMENT_TYPES_WRITE)?;
        let doc_type = services
            .document_types
            .update(tenant_id, entity_id(id), input.into())
            .await
            .extend()?;
        Ok(doc_type.into())
    }

    /// Fails with `CONFLICT` while documents reference the type.
    async fn delete_document_type(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<bool> {
        let (services, tenant_id) = guard(ctx, "deleteDocumentType", Permission::DOCUMENT_TYPES_WRITE)?;
        services
            .document_types
            .delete(tenant_id, entity_id(id))
            .await
            .extend()?;
        Ok(true)
    }

    /// Accept a file and queue it for the bucket. The returned document is
    /// `PENDING`; watch `document(id)` or the `/stream` feed for the outcome.
    async fn upload_document(&self, ctx: &Context<'_>, input: UploadDocumentInput) -> GqlResult<GqlDocument> {
        let (services, tenant_id) = guard(ctx, "uploadDocument", Permission::DOCUMENTS_UPLOAD)?;
        let req = UploadRequest {
            document_type_id: entity_id(input.document_type_id),
            property_id: input.property_id.map(entity_id),
            file_name: input.file_name,
            content_type: input.content_type,
            content_base64: input.content_base64,
        };
        let doc = services.documents.upload(tenant_id, req).await.extend()?;
        Ok(GqlDocument::new(doc, None))
    }

    /// Requeue the failed upload of a document.
    async fn retry_document_upload(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<GqlDocument> {
        let (services, tenant_id) = guard(ctx, "retryDocumentUpload", Permission::DOCUMENTS_UPLOAD)?;
        let doc = services
            .documents
            .retry_upload(tenant_id, entity_id(id))
            .await
            .extend()?;
        Ok(GqlDocument::new(doc, None))
    }

    async fn delete_document(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<bool> {
        let (services, tenant_id) = guard(ctx, "deleteDocument", Permission::DOCUMENTS_DELETE)?;
        services.documents.delete(tenant_id, entity_id(id)).await.extend()?;
        Ok(true)
    }
}
