//! Postgres-backed repositories.
//!
//! Every query carries `tenant_id` in its WHERE clause (or as part of the
//! primary key), so cross-tenant reads are impossible by construction.
//! Rows are mapped by hand with `Row::try_get`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use propdesk_core::{EntityId, TenantId};
use propdesk_documents::{Document, DocumentFilter, DocumentType, UploadStatus};
use propdesk_properties::{Property, Tenant};

use super::{
    DocumentRepository, DocumentTypeRepository, PropertyRepository, RepoError, RepoResult,
    TenantRepository,
};

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> RepoResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RepoError::Database(format!("migration failed: {e}")))
}

pub struct PostgresTenantRepository {
    pool: Arc<PgPool>,
}

impl PostgresTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const TENANT_COLUMNS: &str = "id, name, slug, active, created_at, updated_at";

fn tenant_from_row(row: &PgRow) -> Result<Tenant, sqlx::Error> {
    Ok(Tenant {
        id: TenantId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn insert(&self, tenant: &Tenant) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, slug, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %id), err)]
    async fn get(&self, id: TenantId) -> RepoResult<Option<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant", e))?;
        row.as_ref()
            .map(tenant_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_tenant", e))
    }

    #[instrument(skip(self), err)]
    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE slug = $1");
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant_by_slug", e))?;
        row.as_ref()
            .map(tenant_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_tenant_by_slug", e))
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn update(&self, tenant: &Tenant) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET name = $2, slug = $3, active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.active)
        .bind(tenant.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_tenant", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> RepoResult<Vec<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tenants", e))?;
        rows.iter()
            .map(tenant_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_tenants", e))
    }
}

pub struct PostgresPropertyRepository {
    pool: Arc<PgPool>,
}

impl PostgresPropertyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const PROPERTY_COLUMNS: &str = "id, tenant_id, name, address, unit_count, created_at, updated_at";

fn property_from_row(row: &PgRow) -> Result<Property, sqlx::Error> {
    let unit_count: i32 = row.try_get("unit_count")?;
    Ok(Property {
        id: EntityId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        unit_count: unit_count.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PropertyRepository for PostgresPropertyRepository {
    #[instrument(skip(self, property), fields(tenant_id = %property.tenant_id, property_id = %property.id), err)]
    async fn insert(&self, property: &Property) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO properties (id, tenant_id, name, address, unit_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(property.id.as_uuid())
        .bind(property.tenant_id.as_uuid())
        .bind(&property.name)
        .bind(&property.address)
        .bind(property.unit_count as i32)
        .bind(property.created_at)
        .bind(property.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_property", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, property_id = %id), err)]
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Property>> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_property", e))?;
        row.as_ref()
            .map(property_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_property", e))
    }

    #[instrument(skip(self, property), fields(tenant_id = %property.tenant_id, property_id = %property.id), err)]
    async fn update(&self, property: &Property) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE properties
            SET name = $3, address = $4, unit_count = $5, updated_at = $6
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(property.tenant_id.as_uuid())
        .bind(property.id.as_uuid())
        .bind(&property.name)
        .bind(&property.address)
        .bind(property.unit_count as i32)
        .bind(property.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_property", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, property_id = %id), err)]
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM properties WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_property", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<Property>> {
        let sql = format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE tenant_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_properties", e))?;
        rows.iter()
            .map(property_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_properties", e))
    }
}

pub struct PostgresDocumentTypeRepository {
    pool: Arc<PgPool>,
}

impl PostgresDocumentTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const DOCUMENT_TYPE_COLUMNS: &str =
    "id, tenant_id, name, description, allowed_content_types, max_size_bytes, created_at, updated_at";

fn document_type_from_row(row: &PgRow) -> Result<DocumentType, sqlx::Error> {
    let max_size_bytes: i64 = row.try_get("max_size_bytes")?;
    Ok(DocumentType {
        id: EntityId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        allowed_content_types: row.try_get("allowed_content_types")?,
        max_size_bytes: max_size_bytes.max(0) as u64,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl DocumentTypeRepository for PostgresDocumentTypeRepository {
    #[instrument(skip(self, doc_type), fields(tenant_id = %doc_type.tenant_id, document_type_id = %doc_type.id), err)]
    async fn insert(&self, doc_type: &DocumentType) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO document_types
                (id, tenant_id, name, description, allowed_content_types, max_size_bytes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(doc_type.id.as_uuid())
        .bind(doc_type.tenant_id.as_uuid())
        .bind(&doc_type.name)
        .bind(&doc_type.description)
        .bind(&doc_type.allowed_content_types)
        .bind(doc_type.max_size_bytes as i64)
        .bind(doc_type.created_at)
        .bind(doc_type.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_document_type", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_type_id = %id), err)]
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<DocumentType>> {
        let sql = format!(
            "SELECT {DOCUMENT_TYPE_COLUMNS} FROM document_types WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_document_type", e))?;
        row.as_ref()
            .map(document_type_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_document_type", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_by_name(&self, tenant_id: TenantId, name: &str) -> RepoResult<Option<DocumentType>> {
        let sql = format!(
            "SELECT {DOCUMENT_TYPE_COLUMNS} FROM document_types WHERE tenant_id = $1 AND lower(name) = lower($2)"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(name.trim())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_document_type_by_name", e))?;
        row.as_ref()
            .map(document_type_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_document_type_by_name", e))
    }

    #[instrument(skip(self, doc_type), fields(tenant_id = %doc_type.tenant_id, document_type_id = %doc_type.id), err)]
    async fn update(&self, doc_type: &DocumentType) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE document_types
            SET name = $3, description = $4, allowed_content_types = $5, max_size_bytes = $6, updated_at = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(doc_type.tenant_id.as_uuid())
        .bind(doc_type.id.as_uuid())
        .bind(&doc_type.name)
        .bind(&doc_type.description)
        .bind(&doc_type.allowed_content_types)
        .bind(doc_type.max_size_bytes as i64)
        .bind(doc_type.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_document_type", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_type_id = %id), err)]
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM document_types WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_document_type", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<DocumentType>> {
        let sql = format!(
            "SELECT {DOCUMENT_TYPE_COLUMNS} FROM document_types WHERE tenant_id = $1 ORDER BY lower(name) ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_document_types", e))?;
        rows.iter()
            .map(document_type_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_document_types", e))
    }
}

pub struct PostgresDocumentRepository {
    pool: Arc<PgPool>,
}

impl PostgresDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const DOCUMENT_COLUMNS: &str = "id, tenant_id, document_type_id, property_id, file_name, content_type, \
     size_bytes, storage_key, status, failure_reason, attempts, created_at, updated_at, uploaded_at";

fn document_from_row(row: &PgRow) -> Result<Document, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = UploadStatus::parse(&status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    let attempts: i32 = row.try_get("attempts")?;
    let property_id: Option<uuid::Uuid> = row.try_get("property_id")?;
    let uploaded_at: Option<DateTime<Utc>> = row.try_get("uploaded_at")?;
    Ok(Document {
        id: EntityId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        document_type_id: EntityId::from_uuid(row.try_get("document_type_id")?),
        property_id: property_id.map(EntityId::from_uuid),
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        size_bytes: size_bytes.max(0) as u64,
        storage_key: row.try_get("storage_key")?,
        status,
        failure_reason: row.try_get("failure_reason")?,
        attempts: attempts.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        uploaded_at,
    })
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepository {
    #[instrument(skip(self, document), fields(tenant_id = %document.tenant_id, document_id = %document.id), err)]
    async fn insert(&self, document: &Document) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, tenant_id, document_type_id, property_id, file_name, content_type, size_bytes,
                 storage_key, status, failure_reason, attempts, created_at, updated_at, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(document.tenant_id.as_uuid())
        .bind(document.document_type_id.as_uuid())
        .bind(document.property_id.map(uuid::Uuid::from))
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(document.size_bytes as i64)
        .bind(&document.storage_key)
        .bind(document.status.as_str())
        .bind(&document.failure_reason)
        .bind(document.attempts as i32)
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.uploaded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_document", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %id), err)]
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_document", e))?;
        row.as_ref()
            .map(document_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_document", e))
    }

    #[instrument(skip(self, document), fields(tenant_id = %document.tenant_id, document_id = %document.id), err)]
    async fn update(&self, document: &Document) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET property_id = $3, storage_key = $4, status = $5, failure_reason = $6,
                attempts = $7, updated_at = $8, uploaded_at = $9
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(document.tenant_id.as_uuid())
        .bind(document.id.as_uuid())
        .bind(document.property_id.map(uuid::Uuid::from))
        .bind(&document.storage_key)
        .bind(document.status.as_str())
        .bind(&document.failure_reason)
        .bind(document.attempts as i32)
        .bind(document.updated_at)
        .bind(document.uploaded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_document", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %id), err)]
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_document", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(&self, tenant_id: TenantId, filter: DocumentFilter) -> RepoResult<Vec<Document>> {
        // NULL filter parameters match everything.
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE tenant_id = $1 \
               AND ($2::uuid IS NULL OR document_type_id = $2) \
               AND ($3::uuid IS NULL OR property_id = $3) \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.document_type_id.map(uuid::Uuid::from))
            .bind(filter.property_id.map(uuid::Uuid::from))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_documents", e))?;
        rows.iter()
            .map(document_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_documents", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn count_by_type(&self, tenant_id: TenantId, document_type_id: EntityId) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE tenant_id = $1 AND document_type_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_type_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_documents_by_type", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn count_by_property(&self, tenant_id: TenantId, property_id: EntityId) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE tenant_id = $1 AND property_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(property_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_documents_by_property", e))?;
        Ok(count.max(0) as u64)
    }
}

fn expect_one_row(rows_affected: u64) -> RepoResult<()> {
    if rows_affected == 0 {
        Err(RepoError::NotFound)
    } else {
        Ok(())
    }
}

/// Map SQLx errors to repository errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => RepoError::Conflict(msg),
                // foreign_key_violation
                Some("23503") => RepoError::Conflict(msg),
                _ => RepoError::Database(msg),
            }
        }
        sqlx::Error::RowNotFound => RepoError::NotFound,
        other => RepoError::Database(format!("{} failed: {}", operation, other)),
    }
}
