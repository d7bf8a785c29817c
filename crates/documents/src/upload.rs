//! Validation of incoming files and their bucket keys.

use propdesk_core::{DomainError, DomainResult, EntityId, TenantId};

use crate::document_type::DocumentType;

const MAX_FILE_NAME_LEN: usize = 255;

/// Metadata of a file submitted for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl FileUpload {
    /// Validate type-independent properties of a submitted file.
    pub fn new(file_name: &str, content_type: &str, size_bytes: u64) -> DomainResult<Self> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(DomainError::validation("file_name cannot be empty"));
        }
        if file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(DomainError::validation(format!(
                "file_name must be at most {MAX_FILE_NAME_LEN} characters"
            )));
        }
        if file_name.contains(['/', '\\', ':']) || file_name == "." || file_name == ".." {
            return Err(DomainError::validation("file_name cannot contain path separators"));
        }
        if file_name.chars().any(char::is_control) {
            return Err(DomainError::validation("file_name cannot contain control characters"));
        }
        if size_bytes == 0 {
            return Err(DomainError::validation("file is empty"));
        }

        let content_type = content_type.trim().to_ascii_lowercase();
        if !content_type.contains('/') {
            return Err(DomainError::validation(format!(
                "invalid content type '{content_type}'"
            )));
        }

        Ok(Self {
            file_name: file_name.to_string(),
            content_type,
            size_bytes,
        })
    }

    /// Check the file against the document type's size cap and allow-list.
    pub fn check_against(&self, doc_type: &DocumentType) -> DomainResult<()> {
        if self.size_bytes > doc_type.max_size_bytes {
            return Err(DomainError::validation(format!(
                "file is {} bytes; '{}' documents are limited to {} bytes",
                self.size_bytes, doc_type.name, doc_type.max_size_bytes
            )));
        }
        if !doc_type.accepts_content_type(&self.content_type) {
            return Err(DomainError::validation(format!(
                "content type '{}' is not accepted for '{}' documents",
                self.content_type, doc_type.name
            )));
        }
        Ok(())
    }
}

/// Bucket object key: `tenants/{tenant}/documents/{document}/{file_name}`.
pub fn storage_key(tenant_id: TenantId, document_id: EntityId, file_name: &str) -> String {
    format!("tenants/{tenant_id}/documents/{document_id}/{file_name}")
}
