use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use propdesk_core::{EntityId, TenantId};
use propdesk_infra::cache::{CacheEntity, CacheService};
use propdesk_infra::repo::{DocumentRepository, PropertyRepository};
use propdesk_properties::{NewProperty, Property, PropertyPatch};

use crate::app::errors::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct PropertyService {
    repo: Arc<dyn PropertyRepository>,
    documents: Arc<dyn DocumentRepository>,
    cache: CacheService,
}

impl PropertyService {
    pub fn new(
        repo: Arc<dyn PropertyRepository>,
        documents: Arc<dyn DocumentRepository>,
        cache: CacheService,
    ) -> Self {
        Self { repo, documents, cache }
    }

    pub async fn get(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<Option<Property>> {
        let key = self.cache.keys().entity(CacheEntity::Property, tenant_id, id);
        let property = self
            .cache
            .get_or_load(&key, CacheEntity::Property.default_ttl(), || self.repo.get(tenant_id, id))
            .await?;
        Ok(property)
    }

    pub async fn list(&self, tenant_id: TenantId) -> ServiceResult<Vec<Property>> {
        let key = self.cache.keys().list(CacheEntity::Property, tenant_id, None);
        let properties = self
            .cache
            .get_or_load(&key, CacheEntity::Property.default_ttl(), || async {
                self.repo.list(tenant_id).await.map(Some)
            })
            .await?;
        Ok(properties.unwrap_or_default())
    }

    #[instrument(skip(self, new), fields(tenant_id = %tenant_id))]
    pub async fn create(&self, tenant_id: TenantId, new: NewProperty) -> ServiceResult<Property> {
        let property = new.into_property(tenant_id, Utc::now());
        self.repo.insert(&property).await?;
        self.invalidate(tenant_id, property.id).await;
        info!(property_id = %property.id, "property created");
        Ok(property)
    }

    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, property_id = %id))]
    pub async fn update(&self, tenant_id: TenantId, id: EntityId, patch: PropertyPatch) -> ServiceResult<Property> {
        let mut property = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("property"))?;
        if property.apply_update(patch, Utc::now())? {
            self.repo.update(&property).await?;
            self.invalidate(tenant_id, id).await;
        }
        Ok(property)
    }

    /// Delete a property no document is attached to.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, property_id = %id))]
    pub async fn delete(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<()> {
        let attached = self.documents.count_by_property(tenant_id, id).await?;
        if attached > 0 {
            return Err(ServiceError::conflict(format!(
                "property has {attached} attached document(s)"
            )));
        }
        if !self.repo.delete(tenant_id, id).await? {
            return Err(ServiceError::NotFound("property"));
        }
        self.invalidate(tenant_id, id).await;
        info!("property deleted");
        Ok(())
    }

    async fn invalidate(&self, tenant_id: TenantId, id: EntityId) {
        let keys = self
            .cache
            .keys()
            .invalidation_set(CacheEntity::Property, tenant_id, id, &[]);
        self.cache.invalidate(&keys).await;
    }
}
