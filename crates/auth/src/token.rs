//! Token issuance and verification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Header, Validation};
use thiserror::Error;

use propdesk_core::UserId;

use crate::{AuthzError, Claims, KeyError, KeyLookup, Rule, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("key resolution: {0}")]
    KeyResolution(#[from] KeyError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Authorization(#[from] AuthzError),

    #[error("token encoding: {0}")]
    Encoding(String),
}

impl AuthError {
    fn authn(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(e: TokenValidationError) -> Self {
        Self::Authentication(e.to_string())
    }
}

/// Signs and verifies bearer tokens, and evaluates authorization rules.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<dyn KeyLookup>,
    issuer: String,
}

impl TokenService {
    pub fn new(keys: Arc<dyn KeyLookup>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `claims` with the key named `kid`; the token header carries `kid`.
    pub fn generate_token(&self, kid: &str, claims: &Claims) -> Result<String, AuthError> {
        let key = self.keys.resolve(kid)?;
        let signing = key
            .signing_key()
            .ok_or_else(|| KeyError::VerifyOnly(kid.to_string()))?;

        let mut header = Header::new(key.algorithm());
        header.kid = Some(kid.to_string());

        jsonwebtoken::encode(&header, claims, signing).map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Verify an `Authorization` header value and return its claims.
    ///
    /// Every failure (missing header, wrong scheme, unknown `kid`, signature,
    /// issuer, validity window) is reported as [`AuthError::Authentication`].
    pub fn authenticate(&self, header: Option<&str>, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let header = header.ok_or_else(|| AuthError::authn("expected authorization header format: Bearer <token>"))?;

        let mut parts = header.trim().splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().map(str::trim).unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AuthError::authn("expected authorization header format: Bearer <token>"));
        }

        let jwt_header = jsonwebtoken::decode_header(token).map_err(|e| AuthError::authn(e.to_string()))?;
        let kid = jwt_header
            .kid
            .ok_or_else(|| AuthError::authn("missing kid in token header"))?;
        let key = self
            .keys
            .resolve(&kid)
            .map_err(|e| AuthError::authn(e.to_string()))?;

        let mut validation = Validation::new(key.algorithm());
        // The validity window is checked against the caller's clock below.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = jsonwebtoken::decode::<Claims>(token, key.verifying_key(), &validation)
            .map_err(|e| AuthError::authn(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }

    pub fn authorize(&self, claims: Option<&Claims>, owner: Option<UserId>, rule: Rule) -> Result<(), AuthError> {
        crate::authorize(claims, owner, rule).map_err(AuthError::from)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
