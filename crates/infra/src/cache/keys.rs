//! Cache key mapping.
//!
//! Keys are namespaced by prefix and tenant so one tenant can never read or
//! invalidate another tenant's entries:
//!
//! ```text
//! {prefix}:t:{tenant}:{segment}:{id}
//! {prefix}:t:{tenant}:{segment}:list:{scope}
//! {prefix}:tenant:{tenant}
//! ```

use std::fmt;
use std::time::Duration;

use propdesk_core::{EntityId, TenantId};
use propdesk_documents::DocumentFilter;

pub const DEFAULT_PREFIX: &str = "propdesk";

/// Scope of the unfiltered list of an entity.
pub const LIST_ALL: &str = "all";

/// Entities that are served through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEntity {
    Tenant,
    Property,
    DocumentType,
    Document,
}

impl CacheEntity {
    pub fn segment(self) -> &'static str {
        match self {
            CacheEntity::Tenant => "tenant",
            CacheEntity::Property => "property",
            CacheEntity::DocumentType => "document_type",
            CacheEntity::Document => "document",
        }
    }

    /// Default time-to-live. Tenant records and document types change
    /// rarely; documents move through upload states and expire quickly.
    pub fn default_ttl(self) -> Duration {
        match self {
            CacheEntity::Tenant => Duration::from_secs(600),
            CacheEntity::DocumentType => Duration::from_secs(300),
            CacheEntity::Property => Duration::from_secs(120),
            CacheEntity::Document => Duration::from_secs(60),
        }
    }
}

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn entity(prefix: &str, entity: CacheEntity, tenant_id: TenantId, id: EntityId) -> Self {
        Self(format!(
            "{}:t:{}:{}:{}",
            sanitize(prefix),
            tenant_id,
            entity.segment(),
            id
        ))
    }

    pub fn list(prefix: &str, entity: CacheEntity, tenant_id: TenantId, scope: Option<&str>) -> Self {
        let scope = scope.map(sanitize).unwrap_or_else(|| LIST_ALL.to_string());
        Self(format!(
            "{}:t:{}:{}:list:{}",
            sanitize(prefix),
            tenant_id,
            entity.segment(),
            scope
        ))
    }

    pub fn tenant_record(prefix: &str, tenant_id: TenantId) -> Self {
        Self(format!("{}:tenant:{}", sanitize(prefix), tenant_id))
    }

    /// Prefix shared by every tenant-scoped key of `tenant_id`.
    pub fn tenant_prefix(prefix: &str, tenant_id: TenantId) -> String {
        format!("{}:t:{}:", sanitize(prefix), tenant_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// List scope for documents attached to one property.
pub fn property_scope(property_id: EntityId) -> String {
    format!("property_{property_id}")
}

/// List scope for documents of one document type.
pub fn document_type_scope(document_type_id: EntityId) -> String {
    format!("document_type_{document_type_id}")
}

/// List scope a document listing is cached under; `None` is `list:all`.
pub fn document_filter_scope(filter: &DocumentFilter) -> Option<String> {
    match (filter.document_type_id, filter.property_id) {
        (None, None) => None,
        (Some(t), None) => Some(document_type_scope(t)),
        (None, Some(p)) => Some(property_scope(p)),
        (Some(t), Some(p)) => Some(format!("{}_{}", document_type_scope(t), property_scope(p))),
    }
}

/// Every list scope that can contain a document of this type and property.
pub fn document_list_scopes(document_type_id: EntityId, property_id: Option<EntityId>) -> Vec<String> {
    let by_type = DocumentFilter {
        document_type_id: Some(document_type_id),
        property_id: None,
    };
    let mut scopes: Vec<String> = document_filter_scope(&by_type).into_iter().collect();
    if let Some(p) = property_id {
        for filter in [
            DocumentFilter { document_type_id: None, property_id: Some(p) },
            DocumentFilter { document_type_id: Some(document_type_id), property_id: Some(p) },
        ] {
            scopes.extend(document_filter_scope(&filter));
        }
    }
    scopes
}

/// Replace separators so a free-form component cannot address another key.
///
/// Lossy: `"a b"`, `"a:b"` and `"a_b"` map to the same component. List scopes
/// are built from entity ids and the prefix comes from configuration, so
/// neither contains a replaced character; a scope built from user input
/// would need escaping instead.
fn sanitize(component: &str) -> String {
    component
        .trim()
        .chars()
        .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Key derivation bound to one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapper {
    prefix: String,
}

impl Default for KeyMapper {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl KeyMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.trim().is_empty() {
            DEFAULT_PREFIX.to_string()
        } else {
            sanitize(&prefix)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entity(&self, entity: CacheEntity, tenant_id: TenantId, id: EntityId) -> CacheKey {
        CacheKey::entity(&self.prefix, entity, tenant_id, id)
    }

    pub fn list(&self, entity: CacheEntity, tenant_id: TenantId, scope: Option<&str>) -> CacheKey {
        CacheKey::list(&self.prefix, entity, tenant_id, scope)
    }

    pub fn tenant_record(&self, tenant_id: TenantId) -> CacheKey {
        CacheKey::tenant_record(&self.prefix, tenant_id)
    }

    pub fn tenant_prefix(&self, tenant_id: TenantId) -> String {
        CacheKey::tenant_prefix(&self.prefix, tenant_id)
    }

    /// Every key that may hold stale data after a write to `id`: the entity
    /// key, the unfiltered list and each extra list scope. Sorted, no
    /// duplicates.
    ///
    /// `Tenant` maps to the tenant record key; tenants have no lists.
    pub fn invalidation_set(
        &self,
        entity: CacheEntity,
        tenant_id: TenantId,
        id: EntityId,
        extra_scopes: &[String],
    ) -> Vec<CacheKey> {
        if entity == CacheEntity::Tenant {
            return vec![self.tenant_record(tenant_id)];
        }
        let mut keys = Vec::with_capacity(2 + extra_scopes.len());
        keys.push(self.entity(entity, tenant_id, id));
        keys.push(self.list(entity, tenant_id, None));
        keys.extend(
            extra_scopes
                .iter()
                .map(|scope| self.list(entity, tenant_id, Some(scope))),
        );
        keys.sort();
        keys.dedup();
        keys
    }
}
