//! Computing digest and signature values into a marshalled `ds:Signature`
//!
//! Signing writes into the existing DOM in place. The Signature object's
//! payload is updated to match without dropping any DOM cache, so the signed
//! tree can be marshalled (or serialized) again without losing the values.

use super::c14n::canonicalize;
use super::credential::Credential;
use super::crypto::sign_bytes;
use super::reference;
use super::signature::{Signature, SignedInfoView};
use crate::error::{Error, SignatureError};
use crate::xml::marshaller::marshall;
use crate::xml::registry::ProviderRegistry;
use crate::xml::tree::{ObjectId, XmlTree};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

fn dom_failure(e: Error) -> SignatureError {
    SignatureError::Canonicalization(format!("DOM update failed: {}", e))
}

/// Sign a Signature object whose DOM is already in place.
///
/// The signature (and therefore the content it references) must have been
/// marshalled first; an unmarshalled signature fails with
/// [`SignatureError::NotMarshalled`].
pub fn sign(tree: &mut XmlTree, signature: ObjectId, credential: &Credential) -> Result<(), SignatureError> {
    let element = tree
        .dom(signature)
        .ok_or_else(|| SignatureError::NotMarshalled(format!("signature object {}", signature)))?;
    let payload = tree
        .payload::<Signature>(signature)
        .map_err(|e| SignatureError::NotMarshalled(e.to_string()))?;
    let algorithm = payload.signature_algorithm;
    let output_length = payload.hmac_output_length;

    let mut doc = element.document().borrow_mut();
    let view = SignedInfoView::read(&doc, element.node())?;

    let mut digests = Vec::with_capacity(view.references.len());
    for reference_view in &view.references {
        let uri = reference_view.uri.clone().unwrap_or_default();
        let digest = reference::digest(
            &doc,
            element.node(),
            &uri,
            &reference_view.transforms,
            &reference_view.inclusive_prefixes,
            reference_view.digest,
        )?;
        let encoded = STANDARD.encode(digest);
        doc.set_text_content(reference_view.digest_value_node, encoded.as_str())
            .map_err(dom_failure)?;
        digests.push(encoded);
    }

    let signed_info = canonicalize(&doc, view.signed_info, view.canonicalization, None, &[])?;
    let value = STANDARD.encode(sign_bytes(algorithm, output_length, credential, &signed_info)?);
    doc.set_text_content(view.signature_value_node, value.as_str())
        .map_err(dom_failure)?;
    drop(doc);

    let payload = tree
        .payload_mut_raw::<Signature>(signature)
        .map_err(|e| SignatureError::NotMarshalled(e.to_string()))?;
    for (reference, digest) in payload.references.iter_mut().zip(digests) {
        reference.digest_value = Some(digest);
    }
    payload.signature_value = Some(value);
    debug!(algorithm = algorithm.uri(), "computed signature value");
    Ok(())
}

/// Marshall the tree holding `signature` (reusing any valid cache) and sign it
pub fn marshall_and_sign(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    signature: ObjectId,
    credential: &Credential,
) -> Result<(), SignatureError> {
    let root = tree.root_of(signature);
    marshall(tree, registry, root).map_err(|e| SignatureError::NotMarshalled(e.to_string()))?;
    sign(tree, signature, credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::saml2::Assertion;
    use crate::xmlsec::algorithm::{HashFunction, SignatureAlgorithm};
    use crate::xmlsec::signature::ContentReference;

    #[test]
    fn test_sign_requires_dom() {
        let mut tree = XmlTree::new();
        let signature = tree.add(Signature::default());
        let err = sign(&mut tree, signature, &Credential::hmac(b"k".to_vec())).unwrap_err();
        assert!(matches!(err, SignatureError::NotMarshalled(_)));
    }

    #[test]
    fn test_sign_fills_values_and_keeps_cache() {
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("s1"));
        let signature = tree.add(
            Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
                .with_reference(ContentReference::enveloped(assertion)),
        );
        tree.attach(assertion, signature).unwrap();

        marshall_and_sign(&mut tree, &registry, signature, &Credential::hmac(b"key".to_vec())).unwrap();
        assert!(tree.dom(assertion).is_some());
        assert!(tree.dom(signature).is_some());

        let payload = tree.payload::<Signature>(signature).unwrap();
        let digest = payload.references[0].digest_value.clone().unwrap();
        assert_eq!(STANDARD.decode(&digest).unwrap().len(), 32);
        let value = payload.signature_value.clone().unwrap();
        assert_eq!(STANDARD.decode(&value).unwrap().len(), 32);

        let element = tree.dom(signature).unwrap();
        let doc = element.document().borrow();
        let view = SignedInfoView::read(&doc, element.node()).unwrap();
        assert_eq!(view.references[0].digest_value, digest);
        assert_eq!(view.signature_value, value);
    }
}
