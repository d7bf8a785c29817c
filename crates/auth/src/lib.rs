//! `propdesk-auth`: authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it verifies tokens, models
//! principals and answers "may this principal do X in this tenant?".

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, authorize_all, AuthzError, Principal, RequiresPermissions};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use policy::permissions_for_roles;
pub use principal::TenantMembership;
pub use roles::Role;
