//! Properties domain module: tenant records and the properties they manage.
//!
//! Pure domain logic (no IO, no HTTP, no storage). Constructors validate
//! their input and return `DomainResult`.

pub mod property;
pub mod tenant;

pub use property::{NewProperty, Property, PropertyPatch};
pub use tenant::{NewTenant, Tenant, TenantPatch};
