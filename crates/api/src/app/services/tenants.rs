use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use propdesk_core::TenantId;
use propdesk_infra::cache::{CacheEntity, CacheService};
use propdesk_infra::repo::{RepoError, TenantRepository};
use propdesk_properties::{NewTenant, Tenant, TenantPatch};

use crate::app::errors::{ServiceError, ServiceResult};

/// Changes accepted by `updateTenant`.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub patch: TenantPatch,
    pub active: Option<bool>,
}

#[derive(Clone)]
pub struct TenantService {
    repo: Arc<dyn TenantRepository>,
    cache: CacheService,
    auto_provision: bool,
}

impl TenantService {
    pub fn new(repo: Arc<dyn TenantRepository>, cache: CacheService, auto_provision: bool) -> Self {
        Self {
            repo,
            cache,
            auto_provision,
        }
    }

    pub async fn get(&self, tenant_id: TenantId) -> ServiceResult<Option<Tenant>> {
        let key = self.cache.keys().tenant_record(tenant_id);
        let tenant = self
            .cache
            .get_or_load(&key, CacheEntity::Tenant.default_ttl(), || self.repo.get(tenant_id))
            .await?;
        Ok(tenant)
    }

    /// The active tenant record a request may act for.
    ///
    /// Unknown tenants are provisioned when auto-provisioning is on and
    /// rejected otherwise; inactive tenants are always rejected.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn resolve(&self, tenant_id: TenantId) -> ServiceResult<Tenant> {
        let tenant = match self.get(tenant_id).await? {
            Some(tenant) => tenant,
            None if self.auto_provision => self.provision(tenant_id).await?,
            None => return Err(ServiceError::Forbidden("unknown tenant".to_string())),
        };
        if !tenant.active {
            return Err(ServiceError::Forbidden("tenant is inactive".to_string()));
        }
        Ok(tenant)
    }

    async fn provision(&self, tenant_id: TenantId) -> ServiceResult<Tenant> {
        let tenant = NewTenant::provisioned(tenant_id).into_tenant(Utc::now());
        match self.repo.insert(&tenant).await {
            Ok(()) => {
                info!(tenant_id = %tenant_id, slug = %tenant.slug, "tenant provisioned");
                Ok(tenant)
            }
            // Lost a race with a concurrent first request.
            Err(RepoError::Conflict(_)) => self
                .repo
                .get(tenant_id)
                .await?
                .ok_or(ServiceError::NotFound("tenant")),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, update), fields(tenant_id = %tenant_id))]
    pub async fn update(&self, tenant_id: TenantId, update: TenantUpdate) -> ServiceResult<Tenant> {
        let mut tenant = self
            .repo
            .get(tenant_id)
            .await?
            .ok_or(ServiceError::NotFound("tenant"))?;
        let now = Utc::now();

        let mut changed = tenant.apply_patch(update.patch, now)?;
        match update.active {
            Some(true) if !tenant.active => {
                tenant.activate(now)?;
                changed = true;
            }
            Some(false) if tenant.active => {
                tenant.deactivate(now)?;
                changed = true;
            }
            _ => {}
        }
        if !changed {
            return Ok(tenant);
        }

        if let Some(other) = self.repo.get_by_slug(&tenant.slug).await? {
            if other.id != tenant_id {
                return Err(ServiceError::conflict(format!("slug '{}' is already taken", tenant.slug)));
            }
        }

        self.repo.update(&tenant).await?;
        self.cache.invalidate(&[self.cache.keys().tenant_record(tenant_id)]).await;
        if !tenant.active {
            self.cache.invalidate_tenant(tenant_id).await;
        }
        info!(tenant_id = %tenant_id, active = tenant.active, "tenant updated");
        Ok(tenant)
    }
}
