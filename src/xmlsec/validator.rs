//! Cryptographic signature verification
//!
//! Every Reference digest is recomputed over the parsed DOM and compared in
//! constant time, then the SignatureValue is checked over the canonical
//! SignedInfo. Any failure is an error; there is no partial success.

use super::c14n::canonicalize;
use super::credential::Credential;
use super::crypto::{constant_time_eq, verify_bytes};
use super::profile::signature_for;
use super::reference;
use super::signature::SignedInfoView;
use crate::error::{SignatureError, ValidationError};
use crate::validation::{ValidationContext, ValidationResult, Validator};
use crate::xml::tree::{ObjectId, XmlTree};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

fn decode(what: &str, value: &str) -> Result<Vec<u8>, SignatureError> {
    STANDARD
        .decode(value)
        .map_err(|e| SignatureError::Base64(format!("{}: {}", what, e)))
}

/// Verifies signatures against one trusted credential
#[derive(Debug, Clone)]
pub struct SignatureValidator {
    credential: Credential,
}

impl SignatureValidator {
    /// Trust `credential`
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Verify the Signature object `signature`
    pub fn verify(&self, tree: &XmlTree, signature: ObjectId) -> Result<(), SignatureError> {
        let element = tree
            .dom(signature)
            .ok_or_else(|| SignatureError::NotMarshalled(format!("signature object {}", signature)))?;
        let doc = element.document().borrow();
        let view = SignedInfoView::read(&doc, element.node())?;
        if view.references.is_empty() {
            return Err(SignatureError::Reference("SignedInfo has no Reference".to_string()));
        }

        for reference_view in &view.references {
            let uri = reference_view.uri.as_deref().unwrap_or("");
            let expected = decode("DigestValue", &reference_view.digest_value)?;
            let actual = reference::digest(
                &doc,
                element.node(),
                uri,
                &reference_view.transforms,
                &reference_view.inclusive_prefixes,
                reference_view.digest,
            )?;
            if !constant_time_eq(&expected, &actual) {
                return Err(SignatureError::DigestMismatch(uri.to_string()));
            }
        }

        let signed_info = canonicalize(&doc, view.signed_info, view.canonicalization, None, &[])?;
        let value = decode("SignatureValue", &view.signature_value)?;
        verify_bytes(
            view.algorithm,
            view.hmac_output_length,
            &self.credential,
            &signed_info,
            &value,
        )?;
        debug!(algorithm = view.algorithm.uri(), "signature verified");
        Ok(())
    }
}

impl Validator for SignatureValidator {
    fn name(&self) -> &str {
        "signature"
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
        match self.verify(tree, signature) {
            Ok(()) => Ok(ValidationResult::Valid),
            Err(e) => {
                warn!(error = %e, "signature verification failed");
                Ok(ctx.fail(ValidationResult::Invalid, format!("signature verification failed: {}", e)))
            }
        }
    }
}
