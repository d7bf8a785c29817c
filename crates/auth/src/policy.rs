//! Built-in role → permission policy.

use crate::{Permission, Role};

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::TENANTS_READ,
    Permission::PROPERTIES_READ,
    Permission::PROPERTIES_WRITE,
    Permission::DOCUMENT_TYPES_READ,
    Permission::DOCUMENT_TYPES_WRITE,
    Permission::DOCUMENTS_READ,
    Permission::DOCUMENTS_UPLOAD,
    Permission::DOCUMENTS_DELETE,
    Permission::OPS_READ,
];

/// Resolve the effective permissions for a set of roles.
///
/// `admin` grants the wildcard; `manager` everything except tenant
/// management; `viewer` only the `*.read` permissions of a manager.
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| *r == Role::ADMIN) {
        return vec![Permission::WILDCARD];
    }

    let mut perms: Vec<Permission> = Vec::new();
    for role in roles {
        let granted: Vec<Permission> = if *role == Role::MANAGER {
            MANAGER_PERMISSIONS.to_vec()
        } else if *role == Role::VIEWER {
            MANAGER_PERMISSIONS.iter().filter(|p| p.is_read()).cloned().collect()
        } else {
            tracing::debug!(role = %role, "role grants no built-in permissions");
            Vec::new()
        };

        for p in granted {
            if !perms.contains(&p) {
                perms.push(p);
            }
        }
    }
    perms
}
