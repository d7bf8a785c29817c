//! Service wiring: repositories, cache, bucket, job queue and the upload
//! workers, plus the per-area services the GraphQL resolvers call.
//!
//! Reads go through the cache (`CacheService::get_or_load`); every write
//! invalidates the keys `KeyMapper::invalidation_set` derives for it.

use std::sync::Arc;

use anyhow::Context as _;

use propdesk_infra::cache::{CacheService, CacheStore, InMemoryCacheStore, KeyMapper};
use propdesk_infra::config::AppConfig;
use propdesk_infra::jobs::{InMemoryJobStore, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobStore};
use propdesk_infra::realtime::RealtimeHub;
use propdesk_infra::repo::{
    DocumentRepository, DocumentTypeRepository, InMemoryDocumentRepository, InMemoryDocumentTypeRepository,
    InMemoryPropertyRepository, InMemoryTenantRepository, PostgresDocumentRepository,
    PostgresDocumentTypeRepository, PostgresPropertyRepository, PostgresTenantRepository, PropertyRepository,
    TenantRepository,
};
use propdesk_infra::storage::{InMemoryObjectStorage, LocalFsObjectStorage, ObjectStorage};
use propdesk_infra::upload::{DocumentUploadWorker, UPLOAD_JOB_KIND, UploadSettings};

pub mod document_types;
pub mod documents;
pub mod properties;
pub mod tenants;

pub use document_types::DocumentTypeService;
pub use documents::{DocumentService, UploadRequest};
pub use properties::PropertyService;
pub use tenants::{TenantService, TenantUpdate};

/// Backing stores shared by the services and the upload workers.
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantRepository>,
    pub properties: Arc<dyn PropertyRepository>,
    pub document_types: Arc<dyn DocumentTypeRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub cache: CacheService,
    pub storage: Arc<dyn ObjectStorage>,
    pub jobs: Arc<dyn JobStore>,
    pub realtime: RealtimeHub,
}

impl Stores {
    /// In-memory repositories, cache, bucket and queue (dev/test).
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantRepository::new()),
            properties: Arc::new(InMemoryPropertyRepository::new()),
            document_types: Arc::new(InMemoryDocumentTypeRepository::new()),
            documents: Arc::new(InMemoryDocumentRepository::new()),
            cache: CacheService::new(Arc::new(InMemoryCacheStore::new()), KeyMapper::default()),
            storage: Arc::new(InMemoryObjectStorage::default()),
            jobs: InMemoryJobStore::arc(),
            realtime: RealtimeHub::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppServices {
    pub tenants: TenantService,
    pub properties: PropertyService,
    pub document_types: DocumentTypeService,
    pub documents: DocumentService,
    pub stores: Stores,
}

impl AppServices {
    pub fn new(stores: Stores, auto_provision_tenants: bool, upload: UploadSettings) -> Self {
        let tenants = TenantService::new(stores.tenants.clone(), stores.cache.clone(), auto_provision_tenants);
        let properties = PropertyService::new(
            stores.properties.clone(),
            stores.documents.clone(),
            stores.cache.clone(),
        );
        let document_types = DocumentTypeService::new(
            stores.document_types.clone(),
            stores.documents.clone(),
            stores.cache.clone(),
        );
        let documents = DocumentService::new(
            stores.documents.clone(),
            document_types.clone(),
            properties.clone(),
            stores.storage.clone(),
            stores.jobs.clone(),
            stores.cache.clone(),
            upload,
        );

        Self {
            tenants,
            properties,
            document_types,
            documents,
            stores,
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.stores.cache
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.stores.jobs
    }

    pub fn realtime(&self) -> &RealtimeHub {
        &self.stores.realtime
    }

    /// Start the background executor running `documents.upload` jobs.
    pub fn spawn_upload_workers(&self, config: &AppConfig) -> JobExecutorHandle {
        let worker = DocumentUploadWorker::new(
            self.stores.documents.clone(),
            self.stores.storage.clone(),
            self.stores.cache.clone(),
            self.stores.realtime.clone(),
        );

        let mut executor = JobExecutor::new(self.stores.jobs.clone());
        executor.register_handler(UPLOAD_JOB_KIND, Arc::new(worker));
        executor.spawn(
            JobExecutorConfig::default()
                .with_name("document-uploads")
                .with_max_concurrent(config.upload_workers)
                .with_poll_interval(config.job_poll_interval),
        )
    }
}

/// Build the services selected by `config`.
///
/// `USE_PERSISTENT_STORES=true` switches repositories to Postgres (running
/// migrations) and, when `REDIS_URL` is set and the `redis` feature is on,
/// the cache to Redis. The bucket is a local directory when `STORAGE_DIR`
/// is set.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let mut stores = Stores::in_memory();

    if config.use_persistent_stores {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        propdesk_infra::repo::postgres::migrate(&pool)
            .await
            .context("failed to run migrations")?;

        stores.tenants = Arc::new(PostgresTenantRepository::new(pool.clone()));
        stores.properties = Arc::new(PostgresPropertyRepository::new(pool.clone()));
        stores.document_types = Arc::new(PostgresDocumentTypeRepository::new(pool.clone()));
        stores.documents = Arc::new(PostgresDocumentRepository::new(pool));
        tracing::info!("using Postgres repositories");
    }

    let cache_store = build_cache_store(config).await?;
    stores.cache = CacheService::new(cache_store, KeyMapper::new(config.cache_prefix.clone()));
    stores.cache.set_enabled(config.cache_enabled);

    stores.storage = match &config.storage_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using local filesystem bucket");
            Arc::new(LocalFsObjectStorage::new(dir, config.storage_public_base_url.clone()))
        }
        None => match &config.storage_public_base_url {
            Some(base) => Arc::new(InMemoryObjectStorage::new(base.clone())),
            None => Arc::new(InMemoryObjectStorage::default()),
        },
    };

    Ok(AppServices::new(
        stores,
        config.auto_provision_tenants,
        UploadSettings::default(),
    ))
}

async fn build_cache_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if config.use_persistent_stores {
        if let Some(redis_url) = &config.redis_url {
            #[cfg(feature = "redis")]
            {
                let store = propdesk_infra::cache::RedisCacheStore::connect(redis_url)
                    .await
                    .context("failed to connect to Redis")?;
                tracing::info!("using Redis cache store");
                return Ok(Arc::new(store));
            }
            #[cfg(not(feature = "redis"))]
            {
                tracing::warn!(
                    redis_url = %redis_url,
                    "REDIS_URL set but redis feature not enabled, falling back to in-memory cache"
                );
            }
        }
    }

    Ok(match config.cache_max_entries {
        Some(max) => Arc::new(InMemoryCacheStore::with_capacity(max)),
        None => Arc::new(InMemoryCacheStore::new()),
    })
}
