//! Signing/verification key material addressed by key id (`kid`).
//!
//! Several keys may be live at once; tokens are always verified with the key
//! named in their own header.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key {0:?} not found")]
    NotFound(String),

    #[error("key {0:?} cannot sign (verification only)")]
    VerifyOnly(String),

    #[error("invalid key material for {kid:?}: {reason}")]
    Invalid { kid: String, reason: String },

    #[error("reading key directory: {0}")]
    Io(String),
}

/// One key: the algorithm plus the keys needed to sign and/or verify.
#[derive(Clone)]
pub struct KeyMaterial {
    algorithm: Algorithm,
    signing: Option<EncodingKey>,
    verifying: DecodingKey,
}

impl KeyMaterial {
    /// HS256 shared secret; signs and verifies.
    pub fn hmac(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            signing: Some(EncodingKey::from_secret(secret)),
            verifying: DecodingKey::from_secret(secret),
        }
    }

    /// RS256 key pair from PEM. Without a private key the entry only verifies.
    pub fn rsa(kid: &str, private_pem: Option<&[u8]>, public_pem: &[u8]) -> Result<Self, KeyError> {
        let invalid = |e: jsonwebtoken::errors::Error| KeyError::Invalid {
            kid: kid.to_string(),
            reason: e.to_string(),
        };

        let signing = private_pem
            .map(EncodingKey::from_rsa_pem)
            .transpose()
            .map_err(invalid)?;
        let verifying = DecodingKey::from_rsa_pem(public_pem).map_err(invalid)?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            signing,
            verifying,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn signing_key(&self) -> Option<&EncodingKey> {
        self.signing.as_ref()
    }

    pub fn verifying_key(&self) -> &DecodingKey {
        &self.verifying
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.signing.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolves a key id to key material.
pub trait KeyLookup: Send + Sync {
    fn resolve(&self, kid: &str) -> Result<Arc<KeyMaterial>, KeyError>;
}

/// In-process key registry.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<String, Arc<KeyMaterial>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kid: impl Into<String>, key: KeyMaterial) {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kid.into(), Arc::new(key));
    }

    /// Retire a key; tokens signed with it stop verifying.
    pub fn remove(&self, kid: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(kid)
            .is_some()
    }

    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        kids.sort();
        kids
    }

    /// Load RSA keys from a directory.
    ///
    /// `<kid>.pub.pem` holds the public key; an optional `<kid>.pem` next to it
    /// holds the private key. A `<kid>.pem` with no public half is skipped
    /// with a warning.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, KeyError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| KeyError::Io(format!("{}: {e}", dir.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| KeyError::Io(e.to_string()))?.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut loaded = 0;
        for name in &names {
            let Some(kid) = name.strip_suffix(".pub.pem") else {
                if let Some(kid) = name.strip_suffix(".pem") {
                    let public = format!("{kid}.pub.pem");
                    if !names.contains(&public) {
                        tracing::warn!(kid, missing = %public, "private key has no public key; skipped");
                    }
                }
                continue;
            };

            let path = dir.join(name);
            let public = std::fs::read(&path).map_err(|e| KeyError::Io(format!("{}: {e}", path.display())))?;
            let private_path = dir.join(format!("{kid}.pem"));
            let private = match std::fs::read(&private_path) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(KeyError::Io(format!("{}: {e}", private_path.display()))),
            };

            let key = KeyMaterial::rsa(kid, private.as_deref(), &public)?;
            tracing::info!(kid, can_sign = key.signing.is_some(), "loaded signing key");
            self.insert(kid, key);
            loaded += 1;
        }
        Ok(loaded)
    }
}

impl KeyLookup for KeyStore {
    fn resolve(&self, kid: &str) -> Result<Arc<KeyMaterial>, KeyError> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }
}
