use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use propdesk_core::UserId;

use crate::Role;

/// JWT claims model.
///
/// Exists only for the duration of a request; never persisted. Timestamps are
/// serialized as seconds since the epoch (`iat`, `exp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Roles granted to the subject.
    pub roles: Vec<Role>,

    /// Token issuer.
    pub iss: String,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    /// Timestamps are truncated to whole seconds, the precision they have on
    /// the wire.
    pub fn new(
        sub: UserId,
        roles: Vec<Role>,
        issuer: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let issued_at = now.trunc_subsecs(0);
        Self {
            sub,
            roles,
            iss: issuer.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the validity window `[issued_at, expires_at)` against `now`.
///
/// Signature verification happens in [`crate::TokenService`]; this validates
/// the *claims* only.
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>) -> Claims {
        Claims::new(UserId::new(), vec![Role::User], "propdesk", now, Duration::minutes(10))
    }

    #[test]
    fn window_is_half_open() {
        let now = Utc::now();
        let claims = claims_at(now);

        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, claims.expires_at),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims, now - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims.expires_at = claims.issued_at;
        assert_eq!(
            validate_claims(&claims, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn wire_format_uses_registered_claim_names() {
        let claims = claims_at(Utc::now());
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json["iat"].is_i64());
        assert!(json["exp"].is_i64());
        assert_eq!(json["roles"][0], "USER");
        assert_eq!(json["sub"], claims.sub.to_string());
    }

    #[test]
    fn issued_claims_survive_the_wire_unchanged() {
        let now = DateTime::from_timestamp(1_700_000_000, 663_366_577).unwrap();
        let claims = claims_at(now);
        assert_eq!(claims.issued_at.timestamp_subsec_nanos(), 0);

        let decoded: Claims = serde_json::from_value(serde_json::to_value(&claims).unwrap()).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(validate_claims(&decoded, now), Ok(()));
    }
}
