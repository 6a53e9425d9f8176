use propdesk_auth::Claims;
use propdesk_core::{UnitOfWork, UserId};
use propdesk_properties::Property;
use propdesk_users::User;

/// Per-request execution context, stored in the request extensions.
///
/// Filled in stages: authentication sets the claims, the owner loaders set
/// the preloaded entity, the transaction layer sets the unit of work.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub claims: Option<Claims>,
    pub subject_id: Option<UserId>,
    pub unit_of_work: Option<UnitOfWork>,
    pub user: Option<User>,
    pub property: Option<Property>,
}

impl RequestContext {
    pub fn authenticated(claims: Claims) -> Self {
        Self {
            subject_id: Some(claims.sub),
            claims: Some(claims),
            ..Self::default()
        }
    }
}
