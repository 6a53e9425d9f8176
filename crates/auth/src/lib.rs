//! `propdesk-auth`: claims, authorization rules and bearer-token handling.
//!
//! Decoupled from HTTP and storage; the API layer calls into it.

pub mod authorize;
pub mod claims;
pub mod keys;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, Rule, authorize};
pub use claims::{Claims, TokenValidationError, validate_claims};
pub use keys::{KeyError, KeyLookup, KeyMaterial, KeyStore};
pub use roles::{Role, UnknownRole};
pub use token::{AuthError, TokenService};
