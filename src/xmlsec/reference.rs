//! Same-document Reference resolution and digesting
//!
//! References are resolved against the DOM the signature lives in, which for
//! verification is the DOM that was parsed from the wire. Nothing is
//! re-serialized and re-parsed on the way to the digest.

use super::algorithm::{C14nMethod, DigestAlgorithm};
use super::c14n::canonicalize;
use super::signature::Transform;
use crate::dom::{Document, NodeId};
use crate::error::SignatureError;
use tracing::trace;

/// Resolve a same-document Reference URI to exactly one element.
///
/// `""` is the document element of the document holding `signature`;
/// `#id` must match exactly one ID-flagged attribute in that document.
pub fn resolve(doc: &Document, signature: NodeId, uri: &str) -> Result<NodeId, SignatureError> {
    let top = doc.top(signature);
    let scope = if doc.is_element(top) {
        top
    } else {
        doc.document_element()
            .ok_or_else(|| SignatureError::Reference("document has no root element".to_string()))?
    };

    if uri.is_empty() {
        return Ok(scope);
    }
    let Some(id) = uri.strip_prefix('#') else {
        return Err(SignatureError::Reference(format!(
            "only same-document references are supported, got '{}'",
            uri
        )));
    };
    if id.is_empty() || id.starts_with("xpointer(") {
        return Err(SignatureError::Reference(format!("unsupported fragment '{}'", uri)));
    }
    let matches = doc.elements_by_id(scope, id);
    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(SignatureError::Reference(format!("no element with ID '{}'", id))),
        _ => Err(SignatureError::Reference(format!(
            "{} elements share the ID '{}'",
            matches.len(),
            id
        ))),
    }
}

/// Run the transform chain over the referenced element and return the octets
/// to digest
pub fn transform(
    doc: &Document,
    signature: NodeId,
    target: NodeId,
    transforms: &[Transform],
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, SignatureError> {
    let mut exclude = None;
    let mut method = None;
    for step in transforms {
        match step {
            Transform::EnvelopedSignature => {
                if doc.is_ancestor_or_self(target, signature) {
                    exclude = Some(signature);
                }
            }
            Transform::Canonicalization(m) => {
                if method.is_some() {
                    return Err(SignatureError::UnsupportedAlgorithm(
                        "more than one canonicalization transform".to_string(),
                    ));
                }
                method = Some(*m);
            }
            Transform::Other(algorithm) => {
                return Err(SignatureError::UnsupportedAlgorithm(format!("transform {}", algorithm)))
            }
        }
    }
    // a node set left unserialized by the chain is converted with inclusive c14n
    let method = method.unwrap_or(C14nMethod::Inclusive);
    let prefixes: &[String] = if method.is_exclusive() { inclusive_prefixes } else { &[] };
    canonicalize(doc, target, method, exclude, prefixes)
}

/// Resolve, transform and digest one Reference
pub fn digest(
    doc: &Document,
    signature: NodeId,
    uri: &str,
    transforms: &[Transform],
    inclusive_prefixes: &[String],
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>, SignatureError> {
    let target = resolve(doc, signature, uri)?;
    let octets = transform(doc, signature, target, transforms, inclusive_prefixes)?;
    trace!(uri, bytes = octets.len(), "digesting reference");
    Ok(algorithm.digest(&octets))
}
