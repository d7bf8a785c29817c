use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque dotted strings (e.g. `"documents.read"`).
/// The wildcard `"*"` grants everything inside the active tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const TENANTS_READ: Permission = Permission(Cow::Borrowed("tenants.read"));
    pub const TENANTS_MANAGE: Permission = Permission(Cow::Borrowed("tenants.manage"));
    pub const PROPERTIES_READ: Permission = Permission(Cow::Borrowed("properties.read"));
    pub const PROPERTIES_WRITE: Permission = Permission(Cow::Borrowed("properties.write"));
    pub const DOCUMENT_TYPES_READ: Permission = Permission(Cow::Borrowed("document_types.read"));
    pub const DOCUMENT_TYPES_WRITE: Permission = Permission(Cow::Borrowed("document_types.write"));
    pub const DOCUMENTS_READ: Permission = Permission(Cow::Borrowed("documents.read"));
    pub const DOCUMENTS_UPLOAD: Permission = Permission(Cow::Borrowed("documents.upload"));
    pub const DOCUMENTS_DELETE: Permission = Permission(Cow::Borrowed("documents.delete"));
    pub const OPS_READ: Permission = Permission(Cow::Borrowed("ops.read"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_read(&self) -> bool {
        self.as_str().ends_with(".read")
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
