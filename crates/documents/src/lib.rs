//! Documents domain module: document types, documents and the upload
//! status lifecycle.
//!
//! Pure domain logic (no IO). The asynchronous upload pipeline in
//! `propdesk-infra` drives the transitions defined here.

pub mod document;
pub mod document_type;
pub mod upload;

pub use document::{Document, DocumentFilter, UploadStatus};
pub use document_type::{DEFAULT_MAX_SIZE_BYTES, DocumentType, DocumentTypePatch, NewDocumentType};
pub use upload::{FileUpload, storage_key};
