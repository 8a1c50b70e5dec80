//! Signing and verification key material

use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

/// Raw key material
#[derive(Clone)]
pub enum KeyMaterial {
    /// Shared HMAC secret
    Hmac(Vec<u8>),
    /// RSA private key (can also verify)
    RsaPrivate(RsaPrivateKey),
    /// RSA public key (verify only)
    RsaPublic(RsaPublicKey),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmac(secret) => write!(f, "Hmac({} bytes)", secret.len()),
            Self::RsaPrivate(_) => f.write_str("RsaPrivate(..)"),
            Self::RsaPublic(_) => f.write_str("RsaPublic(..)"),
        }
    }
}

/// Key material plus the name it is published under
#[derive(Debug, Clone)]
pub struct Credential {
    /// Name carried in `ds:KeyName`, if any
    pub key_name: Option<String>,
    material: KeyMaterial,
}

impl Credential {
    /// HMAC credential
    pub fn hmac(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_name: None,
            material: KeyMaterial::Hmac(secret.into()),
        }
    }

    /// RSA signing credential
    pub fn rsa_private(key: RsaPrivateKey) -> Self {
        Self {
            key_name: None,
            material: KeyMaterial::RsaPrivate(key),
        }
    }

    /// RSA verification credential
    pub fn rsa_public(key: RsaPublicKey) -> Self {
        Self {
            key_name: None,
            material: KeyMaterial::RsaPublic(key),
        }
    }

    /// Attach a key name
    pub fn with_key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = Some(name.into());
        self
    }

    /// The key material
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// HMAC secret, if this is an HMAC credential
    pub fn hmac_secret(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Hmac(secret) => Some(secret),
            _ => None,
        }
    }

    /// RSA private key, if present
    pub fn rsa_private_key(&self) -> Option<&RsaPrivateKey> {
        match &self.material {
            KeyMaterial::RsaPrivate(key) => Some(key),
            _ => None,
        }
    }

    /// RSA public key, derived from the private key when necessary
    pub fn rsa_public_key(&self) -> Option<RsaPublicKey> {
        match &self.material {
            KeyMaterial::RsaPrivate(key) => Some(key.to_public_key()),
            KeyMaterial::RsaPublic(key) => Some(key.clone()),
            KeyMaterial::Hmac(_) => None,
        }
    }
}
