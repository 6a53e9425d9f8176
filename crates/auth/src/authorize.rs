use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use propdesk_core::UserId;

use crate::{Claims, Role};

/// Authorization rule attached to a route.
///
/// Closed set. Evaluated by [`authorize`] against the caller's claims and, for
/// resource-aware routes, the owner of the targeted resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rule {
    AdminOnly,
    AdminOrSubject,
    UserOnly,
    Any,
}

impl Rule {
    pub const ALL: [Rule; 4] = [Rule::AdminOnly, Rule::AdminOrSubject, Rule::UserOnly, Rule::Any];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::AdminOnly => "admin_only",
            Rule::AdminOrSubject => "admin_or_subject",
            Rule::UserOnly => "user_only",
            Rule::Any => "any",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no claims present")]
    NoClaims,

    #[error("forbidden: rule '{rule}' denied roles {roles:?}")]
    Denied { rule: Rule, roles: Vec<Role> },
}

/// Evaluate `rule` for the given claims and resource owner.
///
/// - No IO
/// - No panics
/// - Total over every (claims, owner, rule) combination
///
/// `owner` is `None` for routes that do not target a specific resource; in that
/// case `AdminOrSubject` only passes for administrators.
pub fn authorize(claims: Option<&Claims>, owner: Option<UserId>, rule: Rule) -> Result<(), AuthzError> {
    let Some(claims) = claims else {
        return Err(AuthzError::NoClaims);
    };

    let allowed = match rule {
        Rule::AdminOnly => claims.has_role(Role::Admin),
        Rule::AdminOrSubject => claims.has_role(Role::Admin) || owner == Some(claims.sub),
        Rule::UserOnly => claims.has_role(Role::User),
        Rule::Any => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(AuthzError::Denied {
            rule,
            roles: claims.roles.clone(),
        })
    }
}
