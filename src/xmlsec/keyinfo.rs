//! Building `ds:KeyInfo` from a credential and reading RSA keys back out

use super::credential::Credential;
use super::signature::{Exponent, KeyInfo, KeyName, KeyValue, Modulus, RsaKeyValue};
use crate::error::{Result, SignatureError};
use crate::xml::tree::{ObjectId, XmlTree};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use tracing::debug;

/// Which parts of a credential end up in a generated `ds:KeyInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfoGenerator {
    /// Emit `ds:KeyName` when the credential is named
    pub emit_key_name: bool,
    /// Emit `ds:KeyValue/ds:RSAKeyValue` for RSA credentials
    pub emit_public_key_value: bool,
}

impl Default for KeyInfoGenerator {
    fn default() -> Self {
        Self {
            emit_key_name: true,
            emit_public_key_value: true,
        }
    }
}

impl KeyInfoGenerator {
    /// Add a detached `ds:KeyInfo` for `credential` to the tree.
    ///
    /// Returns `None` when nothing would be emitted, e.g. for an unnamed
    /// HMAC credential. The secret of an HMAC key is never published.
    pub fn generate(&self, tree: &mut XmlTree, credential: &Credential) -> Result<Option<ObjectId>> {
        let mut children = Vec::new();
        if self.emit_key_name {
            if let Some(name) = &credential.key_name {
                children.push(tree.add(KeyName::new(name.clone())));
            }
        }
        if self.emit_public_key_value {
            if let Some(key) = credential.rsa_public_key() {
                children.push(add_rsa_key_value(tree, &key)?);
            }
        }
        if children.is_empty() {
            return Ok(None);
        }

        let key_info = tree.add(KeyInfo::default());
        for child in children {
            tree.attach(key_info, child)?;
        }
        debug!(%key_info, "generated KeyInfo");
        Ok(Some(key_info))
    }
}

fn add_rsa_key_value(tree: &mut XmlTree, key: &RsaPublicKey) -> Result<ObjectId> {
    let modulus = tree.add(Modulus::from_bytes_be(&key.n().to_bytes_be()));
    let exponent = tree.add(Exponent::from_bytes_be(&key.e().to_bytes_be()));
    let rsa_key_value = tree.add(RsaKeyValue::default());
    tree.attach(rsa_key_value, modulus)?;
    tree.attach(rsa_key_value, exponent)?;
    let key_value = tree.add(KeyValue::default());
    tree.attach(key_value, rsa_key_value)?;
    Ok(key_value)
}

/// The RSA public key carried in a `ds:KeyInfo`, if it has a `ds:RSAKeyValue`
pub fn rsa_public_key(tree: &XmlTree, key_info: ObjectId) -> std::result::Result<Option<RsaPublicKey>, SignatureError> {
    let payload = tree
        .payload::<KeyInfo>(key_info)
        .map_err(|e| SignatureError::Key(e.to_string()))?;
    let rsa_key_value = payload
        .children()
        .iter()
        .filter_map(|&c| tree.payload::<KeyValue>(c).ok())
        .find_map(KeyValue::rsa_key_value);
    let Some(rsa_key_value) = rsa_key_value else {
        return Ok(None);
    };

    let rsa = tree
        .payload::<RsaKeyValue>(rsa_key_value)
        .map_err(|e| SignatureError::Key(e.to_string()))?;
    let modulus = rsa
        .modulus()
        .and_then(|m| tree.payload::<Modulus>(m).ok())
        .and_then(|m| m.value.as_deref())
        .ok_or_else(|| SignatureError::MissingElement("ds:Modulus".to_string()))?;
    let exponent = rsa
        .exponent()
        .and_then(|e| tree.payload::<Exponent>(e).ok())
        .and_then(|e| e.value.as_deref())
        .ok_or_else(|| SignatureError::MissingElement("ds:Exponent".to_string()))?;

    let n = BigUint::from_bytes_be(&decode_crypto_binary("Modulus", modulus)?);
    let e = BigUint::from_bytes_be(&decode_crypto_binary("Exponent", exponent)?);
    RsaPublicKey::new(n, e)
        .map(Some)
        .map_err(|e| SignatureError::Key(format!("invalid RSAKeyValue: {}", e)))
}

fn decode_crypto_binary(what: &str, text: &str) -> std::result::Result<Vec<u8>, SignatureError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| SignatureError::Base64(format!("{}: {}", what, e)))
}
