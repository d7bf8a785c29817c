use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    DomainError, DomainResult, Entity, EntityId, TenantId, TenantScoped, optional_text,
    required_text,
};

/// Size cap applied when a document type does not set its own (10 MiB).
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;
/// Hard ceiling for any document type (100 MiB).
pub const MAX_SIZE_CEILING_BYTES: u64 = 100 * 1024 * 1024;

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 1_000;

/// A tenant-defined category of document (lease, inspection report, ID, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    /// Accepted MIME types; empty means any.
    pub allowed_content_types: Vec<String>,
    pub max_size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocumentType {
    pub name: String,
    pub description: Option<String>,
    pub allowed_content_types: Vec<String>,
    pub max_size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTypePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_size_bytes: Option<u64>,
}

impl NewDocumentType {
    pub fn new(
        name: &str,
        description: Option<&str>,
        allowed_content_types: Vec<String>,
        max_size_bytes: Option<u64>,
    ) -> DomainResult<Self> {
        let max_size_bytes = max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES);
        ensure_max_size(max_size_bytes)?;
        Ok(Self {
            name: required_text("name", name, MAX_NAME_LEN)?,
            description: optional_text("description", description, MAX_DESCRIPTION_LEN)?,
            allowed_content_types: normalize_content_types(allowed_content_types)?,
            max_size_bytes,
        })
    }

    pub fn into_document_type(self, tenant_id: TenantId, now: DateTime<Utc>) -> DocumentType {
        DocumentType {
            id: EntityId::new(),
            tenant_id,
            name: self.name,
            description: self.description,
            allowed_content_types: self.allowed_content_types,
            max_size_bytes: self.max_size_bytes,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DocumentType {
    pub fn apply_update(&mut self, patch: DocumentTypePatch, now: DateTime<Utc>) -> DomainResult<bool> {
        let name = match patch.name {
            Some(n) => required_text("name", &n, MAX_NAME_LEN)?,
            None => self.name.clone(),
        };
        let description = match patch.description {
            Some(d) => optional_text("description", d.as_deref(), MAX_DESCRIPTION_LEN)?,
            None => self.description.clone(),
        };
        let allowed = match patch.allowed_content_types {
            Some(list) => normalize_content_types(list)?,
            None => self.allowed_content_types.clone(),
        };
        let max_size_bytes = patch.max_size_bytes.unwrap_or(self.max_size_bytes);
        ensure_max_size(max_size_bytes)?;

        let changed = name != self.name
            || description != self.description
            || allowed != self.allowed_content_types
            || max_size_bytes != self.max_size_bytes;
        if changed {
            self.name = name;
            self.description = description;
            self.allowed_content_types = allowed;
            self.max_size_bytes = max_size_bytes;
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Whether a file with this MIME type may be stored under this type.
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        self.allowed_content_types.is_empty()
            || self
                .allowed_content_types
                .iter()
                .any(|c| c.eq_ignore_ascii_case(content_type.trim()))
    }

    /// Case-insensitive name comparison used for per-tenant uniqueness.
    pub fn same_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other.trim())
    }
}

fn ensure_max_size(bytes: u64) -> DomainResult<()> {
    if bytes == 0 || bytes > MAX_SIZE_CEILING_BYTES {
        return Err(DomainError::validation(format!(
            "max_size_bytes must be between 1 and {MAX_SIZE_CEILING_BYTES}"
        )));
    }
    Ok(())
}

fn normalize_content_types(list: Vec<String>) -> DomainResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(list.len());
    for raw in list {
        let ct = raw.trim().to_ascii_lowercase();
        let valid = matches!(ct.split_once('/'), Some((a, b)) if !a.is_empty() && !b.is_empty())
            && !ct.contains(char::is_whitespace);
        if !valid {
            return Err(DomainError::validation(format!("invalid content type '{raw}'")));
        }
        if !out.contains(&ct) {
            out.push(ct);
        }
    }
    Ok(out)
}

impl Entity for DocumentType {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantScoped for DocumentType {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
