//! SAML signature profile checks
//!
//! Cryptographic validity alone does not say *what* was signed. These checks
//! pin the single Reference of an enveloped signature to the very element of
//! the object that carries it, which defeats signature-wrapping attacks.

use super::signature::{SignedInfoView, Transform};
use crate::error::{SignatureError, ValidationError};
use crate::validation::{ValidationContext, ValidationResult, Validator};
use crate::xml::kind::ElementTag;
use crate::xml::tree::{ObjectId, XmlTree};
use tracing::warn;

/// The Signature object for `target`: itself when it is a Signature,
/// otherwise its enveloped signature child
pub(crate) fn signature_for(tree: &XmlTree, target: ObjectId) -> Option<ObjectId> {
    match tree.get(target) {
        Ok(object) if object.tag() == ElementTag::Signature => Some(target),
        Ok(_) => tree.signature_of(target),
        Err(_) => None,
    }
}

/// Anti-wrapping profile validator
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureProfileValidator;

impl SignatureProfileValidator {
    /// Check the Signature object `signature` against its parent
    pub fn check(&self, tree: &XmlTree, signature: ObjectId) -> Result<(), SignatureError> {
        let element = tree
            .dom(signature)
            .ok_or_else(|| SignatureError::NotMarshalled(format!("signature object {}", signature)))?;
        let signed = tree
            .parent(signature)
            .ok_or_else(|| SignatureError::Reference("signature has no parent object".to_string()))?;
        let signed_element = tree
            .dom(signed)
            .ok_or_else(|| SignatureError::NotMarshalled(format!("signed object {}", signed)))?;
        if !signed_element.same_document(element.document()) {
            return Err(SignatureError::Reference(
                "signature and signed object live in different documents".to_string(),
            ));
        }

        let doc = element.document().borrow();
        let view = SignedInfoView::read(&doc, element.node())?;
        let [reference] = view.references.as_slice() else {
            return Err(SignatureError::Reference(format!(
                "expected exactly one Reference, found {}",
                view.references.len()
            )));
        };

        let uri = reference.uri.as_deref().unwrap_or("");
        let object_id = tree.xml_id(signed).unwrap_or("");
        if uri.is_empty() {
            if doc.document_element() != Some(signed_element.node()) {
                return Err(SignatureError::Reference(
                    "empty Reference URI but the signed object is not the document element".to_string(),
                ));
            }
        } else {
            let Some(fragment) = uri.strip_prefix('#') else {
                return Err(SignatureError::Reference(format!("Reference URI '{}' is not local", uri)));
            };
            if fragment.is_empty() || fragment != object_id {
                return Err(SignatureError::Reference(format!(
                    "Reference URI '{}' does not name the signed object's ID '{}'",
                    uri, object_id
                )));
            }
            let matches = doc.elements_by_id(doc.root(), fragment);
            if matches.len() != 1 {
                return Err(SignatureError::Reference(format!(
                    "ID '{}' resolves to {} elements",
                    fragment,
                    matches.len()
                )));
            }
            if matches[0] != signed_element.node() {
                return Err(SignatureError::Reference(format!(
                    "ID '{}' resolves to an element other than the signed object",
                    fragment
                )));
            }
        }

        for transform in &reference.transforms {
            match transform {
                Transform::EnvelopedSignature | Transform::Canonicalization(_) => {}
                Transform::Other(algorithm) => {
                    return Err(SignatureError::UnsupportedAlgorithm(format!(
                        "transform {} is not allowed by the SAML signature profile",
                        algorithm
                    )))
                }
            }
        }
        if reference.transforms.len() > 2 {
            return Err(SignatureError::Reference(format!(
                "{} transforms on the Reference",
                reference.transforms.len()
            )));
        }
        Ok(())
    }
}

impl Validator for SignatureProfileValidator {
    fn name(&self) -> &str {
        "signature profile"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(signature) = signature_for(tree, target) else {
            return Ok(ctx.fail(ValidationResult::Invalid, "object is not signed"));
        };
        match self.check(tree, signature) {
            Ok(()) => Ok(ValidationResult::Valid),
            Err(e) => {
                warn!(error = %e, "signature profile check failed");
                Ok(ctx.fail(ValidationResult::Invalid, format!("signature profile: {}", e)))
            }
        }
    }
}
