//! `ds:Signature` and `ds:KeyInfo` bindings
//!
//! The Signature object only records what to sign and how: references,
//! transforms and algorithms. Its marshaller lays out the `SignedInfo`
//! skeleton with whatever digest and signature values are already known;
//! computing them is the job of [`crate::xmlsec::signer`].

use super::algorithm::{uri, C14nMethod, DigestAlgorithm, HashFunction, SignatureAlgorithm};
use crate::dom::{Document, DocumentRef, DomElement, NodeId};
use crate::error::{MarshallingError, Result, SignatureError, UnmarshallingError};
use crate::namespaces::{ns, Namespace, QName};
use crate::xml::kind::{
    place_in_slot, take_from_list, take_from_slot, ChildPlacement, ElementPayload, ElementTag,
    MarshalledAttribute,
};
use crate::xml::marshaller::{declare_if_needed, marshall_child, Marshaller};
use crate::xml::registry::ProviderRegistry;
use crate::xml::tree::{ObjectId, XmlTree};
use crate::xml::unmarshaller::{unmarshall, Unmarshaller};
use crate::xml::KindOf;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

/// What a Reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// An object in the same tree; marshalled as `#` + its ID, or `""`
    /// when it has none
    Object(ObjectId),
    /// A literal URI
    Uri(String),
}

/// One step of a Reference's transform chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Remove the enclosing `ds:Signature` from the node set
    EnvelopedSignature,
    /// Canonicalize the node set
    Canonicalization(C14nMethod),
    /// Any other algorithm; never executed
    Other(String),
}

impl Transform {
    /// Resolve a transform URI
    pub fn from_uri(algorithm: &str) -> Self {
        if algorithm == uri::ENVELOPED_SIGNATURE {
            return Self::EnvelopedSignature;
        }
        match C14nMethod::from_uri(algorithm) {
            Ok(method) => Self::Canonicalization(method),
            Err(_) => Self::Other(algorithm.to_string()),
        }
    }

    /// Transform URI
    pub fn uri(&self) -> &str {
        match self {
            Self::EnvelopedSignature => uri::ENVELOPED_SIGNATURE,
            Self::Canonicalization(method) => method.uri(),
            Self::Other(algorithm) => algorithm,
        }
    }
}

/// A `ds:Reference`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentReference {
    /// Referenced content
    pub target: ReferenceTarget,
    /// Digest method
    pub digest: DigestAlgorithm,
    /// Transform chain, in order
    pub transforms: Vec<Transform>,
    /// InclusiveNamespaces PrefixList of an exclusive c14n transform
    pub inclusive_prefixes: Vec<String>,
    /// Base64 DigestValue, once computed or read
    pub digest_value: Option<String>,
}

impl ContentReference {
    /// The usual SAML reference: enveloped-signature then exclusive c14n,
    /// SHA-256 digest
    pub fn enveloped(target: ObjectId) -> Self {
        Self {
            target: ReferenceTarget::Object(target),
            digest: DigestAlgorithm::SHA256,
            transforms: vec![
                Transform::EnvelopedSignature,
                Transform::Canonicalization(C14nMethod::Exclusive),
            ],
            inclusive_prefixes: Vec::new(),
            digest_value: None,
        }
    }

    /// Use another digest method
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Set the InclusiveNamespaces PrefixList
    pub fn with_inclusive_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusive_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }
}

/// `ds:Signature`
#[derive(Debug, Clone)]
pub struct Signature {
    /// SignedInfo canonicalization method
    pub canonicalization: C14nMethod,
    /// Signature method
    pub signature_algorithm: SignatureAlgorithm,
    /// `HMACOutputLength` in bits
    pub hmac_output_length: Option<usize>,
    /// Content references
    pub references: Vec<ContentReference>,
    /// Base64 SignatureValue, once computed or read
    pub signature_value: Option<String>,
    key_info: Option<ObjectId>,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            canonicalization: C14nMethod::Exclusive,
            signature_algorithm: SignatureAlgorithm::Rsa(HashFunction::Sha256),
            hmac_output_length: None,
            references: Vec::new(),
            signature_value: None,
            key_info: None,
        }
    }
}

impl Signature {
    /// A signature using `algorithm` and exclusive c14n
    pub fn new(algorithm: SignatureAlgorithm) -> Self {
        Self {
            signature_algorithm: algorithm,
            ..Self::default()
        }
    }

    /// Add a content reference
    pub fn add_reference(&mut self, reference: ContentReference) {
        self.references.push(reference);
    }

    /// Builder form of [`Signature::add_reference`]
    pub fn with_reference(mut self, reference: ContentReference) -> Self {
        self.add_reference(reference);
        self
    }

    /// The `ds:KeyInfo` child
    pub fn key_info(&self) -> Option<ObjectId> {
        self.key_info
    }
}

impl ElementPayload for Signature {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.key_info.into_iter().collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::KeyInfo => place_in_slot(&mut self.key_info, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.key_info, child)
    }
}

/// `ds:KeyInfo`
#[derive(Debug, Default)]
pub struct KeyInfo {
    /// `Id` attribute
    pub id: Option<String>,
    children: Vec<ObjectId>,
}

impl KeyInfo {
    /// Child elements (`ds:KeyName`, `ds:KeyValue` and anything else carried generically)
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }
}

impl ElementPayload for KeyInfo {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        if let Some(id) = &self.id {
            out.push(MarshalledAttribute::new("Id", id.clone()));
        }
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> std::result::Result<bool, UnmarshallingError> {
        if *name == QName::local("Id") {
            self.id = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.children.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::KeyName | ElementTag::KeyValue | ElementTag::Any => {
                self.children.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.children, child)
    }
}

/// `ds:KeyName`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyName {
    /// The name
    pub value: Option<String>,
}

impl KeyName {
    /// A key name
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

impl ElementPayload for KeyName {
    fn text_content(&self) -> Option<String> {
        self.value.clone()
    }

    fn process_content(&mut self, text: &str) -> std::result::Result<(), UnmarshallingError> {
        self.value = Some(text.to_string());
        Ok(())
    }
}

/// `ds:KeyValue`
#[derive(Debug, Default)]
pub struct KeyValue {
    rsa_key_value: Option<ObjectId>,
}

impl KeyValue {
    /// The `ds:RSAKeyValue` child
    pub fn rsa_key_value(&self) -> Option<ObjectId> {
        self.rsa_key_value
    }
}

impl ElementPayload for KeyValue {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.rsa_key_value.into_iter().collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::RsaKeyValue => place_in_slot(&mut self.rsa_key_value, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.rsa_key_value, child)
    }
}

/// `ds:RSAKeyValue`
#[derive(Debug, Default)]
pub struct RsaKeyValue {
    modulus: Option<ObjectId>,
    exponent: Option<ObjectId>,
}

impl RsaKeyValue {
    /// The `ds:Modulus` child
    pub fn modulus(&self) -> Option<ObjectId> {
        self.modulus
    }

    /// The `ds:Exponent` child
    pub fn exponent(&self) -> Option<ObjectId> {
        self.exponent
    }
}

impl ElementPayload for RsaKeyValue {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.modulus.into_iter().chain(self.exponent).collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Modulus => place_in_slot(&mut self.modulus, child),
            ElementTag::Exponent => place_in_slot(&mut self.exponent, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.modulus, child) || take_from_slot(&mut self.exponent, child)
    }
}

macro_rules! crypto_binary {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Base64 of the big-endian magnitude
            pub value: Option<String>,
        }

        impl $name {
            /// Encode an unsigned big-endian integer
            pub fn from_bytes_be(bytes: &[u8]) -> Self {
                Self {
                    value: Some(STANDARD.encode(bytes)),
                }
            }
        }

        impl ElementPayload for $name {
            fn text_content(&self) -> Option<String> {
                self.value.clone()
            }

            fn process_content(&mut self, text: &str) -> std::result::Result<(), UnmarshallingError> {
                self.value = Some(text.to_string());
                Ok(())
            }
        }
    };
}

crypto_binary!(
    /// `ds:Modulus`
    Modulus
);
crypto_binary!(
    /// `ds:Exponent`
    Exponent
);

/// First `ds:` child element of `parent` with the given local name
pub(crate) fn ds_child(doc: &Document, parent: NodeId, local: &str) -> Option<NodeId> {
    ds_children(doc, parent, local).into_iter().next()
}

/// All `ds:` child elements of `parent` with the given local name
pub(crate) fn ds_children(doc: &Document, parent: NodeId, local: &str) -> Vec<NodeId> {
    doc.child_elements(parent)
        .into_iter()
        .filter(|&c| doc.element(c).map(|e| e.name.is(ns::DSIG, local)).unwrap_or(false))
        .collect()
}

fn required_child(doc: &Document, parent: NodeId, local: &str) -> std::result::Result<NodeId, SignatureError> {
    ds_child(doc, parent, local).ok_or_else(|| SignatureError::MissingElement(format!("ds:{}", local)))
}

fn algorithm_of(doc: &Document, node: NodeId, element: &str) -> std::result::Result<String, SignatureError> {
    doc.attribute(node, &QName::local("Algorithm"))
        .map(str::to_string)
        .ok_or_else(|| SignatureError::MissingAttribute(format!("Algorithm on ds:{}", element)))
}

/// One `ds:Reference` as it appears in a DOM
#[derive(Debug, Clone)]
pub struct ReferenceView {
    /// The Reference element
    pub node: NodeId,
    /// `URI` attribute; absent is reported as `None`
    pub uri: Option<String>,
    /// Transform chain
    pub transforms: Vec<Transform>,
    /// InclusiveNamespaces PrefixList of the exclusive c14n transform
    pub inclusive_prefixes: Vec<String>,
    /// Digest method
    pub digest: DigestAlgorithm,
    /// The DigestValue element
    pub digest_value_node: NodeId,
    /// DigestValue text with whitespace removed
    pub digest_value: String,
}

/// The signed parts of a `ds:Signature` element read straight from the DOM.
///
/// Verification works from this view rather than from object state, so it
/// always judges the bytes that were actually parsed.
#[derive(Debug, Clone)]
pub struct SignedInfoView {
    /// The SignedInfo element
    pub signed_info: NodeId,
    /// SignedInfo canonicalization
    pub canonicalization: C14nMethod,
    /// Signature method
    pub algorithm: SignatureAlgorithm,
    /// `HMACOutputLength`
    pub hmac_output_length: Option<usize>,
    /// References in document order
    pub references: Vec<ReferenceView>,
    /// The SignatureValue element
    pub signature_value_node: NodeId,
    /// SignatureValue text with whitespace removed
    pub signature_value: String,
}

fn compact(text: String) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

impl SignedInfoView {
    /// Read a `ds:Signature` element
    pub fn read(doc: &Document, signature: NodeId) -> std::result::Result<Self, SignatureError> {
        let is_signature = doc
            .element(signature)
            .map(|e| e.name.is(ns::DSIG, "Signature"))
            .unwrap_or(false);
        if !is_signature {
            return Err(SignatureError::MissingElement("ds:Signature".to_string()));
        }
        let signed_info = required_child(doc, signature, "SignedInfo")?;

        let c14n_node = required_child(doc, signed_info, "CanonicalizationMethod")?;
        let canonicalization = C14nMethod::from_uri(&algorithm_of(doc, c14n_node, "CanonicalizationMethod")?)?;

        let method_node = required_child(doc, signed_info, "SignatureMethod")?;
        let algorithm = SignatureAlgorithm::from_uri(&algorithm_of(doc, method_node, "SignatureMethod")?)?;
        let hmac_output_length = match ds_child(doc, method_node, "HMACOutputLength") {
            Some(node) => {
                let text = doc.text_content(node);
                Some(text.trim().parse::<usize>().map_err(|_| {
                    SignatureError::SignatureInvalid(format!("invalid HMACOutputLength '{}'", text.trim()))
                })?)
            }
            None => None,
        };

        let mut references = Vec::new();
        for node in ds_children(doc, signed_info, "Reference") {
            let mut transforms = Vec::new();
            let mut inclusive_prefixes = Vec::new();
            if let Some(list) = ds_child(doc, node, "Transforms") {
                for transform_node in ds_children(doc, list, "Transform") {
                    let transform = Transform::from_uri(&algorithm_of(doc, transform_node, "Transform")?);
                    for child in doc.child_elements(transform_node) {
                        let is_prefix_list = doc
                            .element(child)
                            .map(|e| e.name.is(ns::EXC_C14N, "InclusiveNamespaces"))
                            .unwrap_or(false);
                        if is_prefix_list {
                            if let Some(list) = doc.attribute(child, &QName::local("PrefixList")) {
                                inclusive_prefixes.extend(list.split_whitespace().map(str::to_string));
                            }
                        }
                    }
                    transforms.push(transform);
                }
            }
            let digest_node = required_child(doc, node, "DigestMethod")?;
            let digest = DigestAlgorithm::from_uri(&algorithm_of(doc, digest_node, "DigestMethod")?)?;
            let digest_value_node = required_child(doc, node, "DigestValue")?;
            references.push(ReferenceView {
                node,
                uri: doc.attribute(node, &QName::local("URI")).map(str::to_string),
                transforms,
                inclusive_prefixes,
                digest,
                digest_value_node,
                digest_value: compact(doc.text_content(digest_value_node)),
            });
        }

        let signature_value_node = required_child(doc, signature, "SignatureValue")?;
        Ok(Self {
            signed_info,
            canonicalization,
            algorithm,
            hmac_output_length,
            references,
            signature_value_node,
            signature_value: compact(doc.text_content(signature_value_node)),
        })
    }
}

/// Marshaller laying out the `ds:SignedInfo` skeleton
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureMarshaller;

fn append_ds(doc: &mut Document, parent: NodeId, prefix: &Option<String>, local: &str) -> Result<NodeId> {
    let node = doc.create_element(QName::new(Some(ns::DSIG), local).with_prefix(prefix.clone()));
    doc.append_child(parent, node)?;
    Ok(node)
}

fn append_with_algorithm(
    doc: &mut Document,
    parent: NodeId,
    prefix: &Option<String>,
    local: &str,
    algorithm: &str,
) -> Result<NodeId> {
    let node = append_ds(doc, parent, prefix, local)?;
    doc.set_attribute(node, QName::local("Algorithm"), algorithm)?;
    Ok(node)
}

fn reference_uri(tree: &XmlTree, target: &ReferenceTarget) -> String {
    match target {
        ReferenceTarget::Object(object) => match tree.xml_id(*object) {
            Some(id) if !id.is_empty() => format!("#{}", id),
            _ => String::new(),
        },
        ReferenceTarget::Uri(uri) => uri.clone(),
    }
}

/// Point references naming `owner` (`""` or `#` + its ID) back at the owner
/// object, so a later ID change is reflected when the signature is
/// marshalled again
pub(crate) fn bind_enveloped_references(tree: &mut XmlTree, signature: ObjectId, owner: ObjectId) -> Result<()> {
    let own_uri = tree.xml_id(owner).map(|id| format!("#{}", id));
    let payload = tree.payload_mut_raw::<Signature>(signature)?;
    for reference in &mut payload.references {
        let names_owner = matches!(
            &reference.target,
            ReferenceTarget::Uri(uri) if uri.is_empty() || Some(uri) == own_uri.as_ref()
        );
        if names_owner {
            reference.target = ReferenceTarget::Object(owner);
        }
    }
    Ok(())
}

impl Marshaller for SignatureMarshaller {
    fn build_dom(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        id: ObjectId,
        doc: &DocumentRef,
        parent: Option<NodeId>,
    ) -> std::result::Result<NodeId, MarshallingError> {
        let name = tree.get(id)?.element_name().clone();
        let signature = tree.payload::<Signature>(id)?.clone();
        let uris: Vec<String> = signature
            .references
            .iter()
            .map(|r| reference_uri(tree, &r.target))
            .collect();
        debug!(references = signature.references.len(), "marshalling ds:Signature");

        let node = {
            let mut d = doc.borrow_mut();
            let prefix = name.prefix.clone();
            let node = d.create_element(name.clone());
            if let Some(parent) = parent {
                d.append_child(parent, node)?;
            }
            declare_if_needed(&mut d, node, &Namespace::new(ns::DSIG, prefix.clone()))?;

            let signed_info = append_ds(&mut d, node, &prefix, "SignedInfo")?;
            append_with_algorithm(
                &mut d,
                signed_info,
                &prefix,
                "CanonicalizationMethod",
                signature.canonicalization.uri(),
            )?;
            let method = append_with_algorithm(
                &mut d,
                signed_info,
                &prefix,
                "SignatureMethod",
                signature.signature_algorithm.uri(),
            )?;
            if let Some(bits) = signature.hmac_output_length {
                let length = append_ds(&mut d, method, &prefix, "HMACOutputLength")?;
                d.set_text_content(length, bits.to_string())?;
            }

            for (reference, uri) in signature.references.iter().zip(&uris) {
                let reference_node = append_ds(&mut d, signed_info, &prefix, "Reference")?;
                d.set_attribute(reference_node, QName::local("URI"), uri.as_str())?;
                if !reference.transforms.is_empty() {
                    let transforms = append_ds(&mut d, reference_node, &prefix, "Transforms")?;
                    for transform in &reference.transforms {
                        let transform_node =
                            append_with_algorithm(&mut d, transforms, &prefix, "Transform", transform.uri())?;
                        let exclusive = matches!(transform, Transform::Canonicalization(m) if m.is_exclusive());
                        if exclusive && !reference.inclusive_prefixes.is_empty() {
                            let list = d.create_element(QName::prefixed(
                                ns::EXC_C14N,
                                "InclusiveNamespaces",
                                ns::EXC_C14N_PREFIX,
                            ));
                            d.append_child(transform_node, list)?;
                            declare_if_needed(
                                &mut d,
                                list,
                                &Namespace::new(ns::EXC_C14N, Some(ns::EXC_C14N_PREFIX)),
                            )?;
                            d.set_attribute(list, QName::local("PrefixList"), reference.inclusive_prefixes.join(" "))?;
                        }
                    }
                }
                append_with_algorithm(&mut d, reference_node, &prefix, "DigestMethod", reference.digest.uri())?;
                let digest_value = append_ds(&mut d, reference_node, &prefix, "DigestValue")?;
                d.set_text_content(digest_value, reference.digest_value.clone().unwrap_or_default())?;
            }

            let value = append_ds(&mut d, node, &prefix, "SignatureValue")?;
            d.set_text_content(value, signature.signature_value.clone().unwrap_or_default())?;
            node
        };

        if let Some(key_info) = signature.key_info {
            marshall_child(tree, registry, key_info, doc, node)?;
        }
        tree.set_dom(id, DomElement::new(doc.clone(), node))?;
        Ok(node)
    }
}

/// Unmarshaller reading the `ds:SignedInfo` structure back
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureUnmarshaller;

impl Unmarshaller for SignatureUnmarshaller {
    fn unmarshall(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        element: &DomElement,
    ) -> std::result::Result<ObjectId, UnmarshallingError> {
        let (name, view, key_info_node, namespaces) = {
            let doc = element.document().borrow();
            let name = doc
                .element(element.node())
                .map(|e| e.name.clone())
                .ok_or_else(|| UnmarshallingError::new("node is not an element"))?;
            let view = SignedInfoView::read(&doc, element.node())
                .map_err(|e| UnmarshallingError::new("malformed ds:Signature").with_source(e))?;
            let namespaces = doc
                .element(element.node())
                .map(|e| e.namespace_decls.clone())
                .unwrap_or_default();
            (name, view, ds_child(&doc, element.node(), "KeyInfo"), namespaces)
        };
        debug!(references = view.references.len(), "unmarshalling ds:Signature");

        let signature = Signature {
            canonicalization: view.canonicalization,
            signature_algorithm: view.algorithm,
            hmac_output_length: view.hmac_output_length,
            references: view
                .references
                .iter()
                .map(|r| ContentReference {
                    target: ReferenceTarget::Uri(r.uri.clone().unwrap_or_default()),
                    digest: r.digest,
                    transforms: r.transforms.clone(),
                    inclusive_prefixes: r.inclusive_prefixes.clone(),
                    digest_value: Some(r.digest_value.clone()),
                })
                .collect(),
            signature_value: Some(view.signature_value),
            key_info: None,
        };
        let id = tree.add_named(name, signature.into_kind());
        tree.init_unmarshalled(id, None, namespaces)?;

        if let Some(node) = key_info_node {
            let child_element = DomElement::new(element.document().clone(), node);
            let attached = unmarshall(tree, registry, &child_element)
                .and_then(|child| tree.attach(id, child).map_err(UnmarshallingError::from));
            if let Err(e) = attached {
                if let Err(cleanup) = tree.discard(id) {
                    warn!(error = %cleanup, "failed to discard partially unmarshalled signature");
                }
                return Err(e);
            }
        }
        tree.set_dom(id, element.clone())?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::ParserPool;
    use crate::xml::marshaller::marshall;
    use crate::saml::saml2::Assertion;

    #[test]
    fn test_marshalled_skeleton_uses_object_id() {
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("abc"));
        let signature = tree.add(
            Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
                .with_reference(ContentReference::enveloped(assertion).with_inclusive_prefixes(["xs"])),
        );
        tree.attach(assertion, signature).unwrap();

        let element = marshall(&mut tree, &registry, assertion).unwrap();
        let doc = element.document().borrow();
        let signature_node = tree.dom(signature).unwrap().node();
        let view = SignedInfoView::read(&doc, signature_node).unwrap();
        assert_eq!(view.references.len(), 1);
        assert_eq!(view.references[0].uri.as_deref(), Some("#abc"));
        assert_eq!(view.references[0].inclusive_prefixes, vec!["xs".to_string()]);
        assert_eq!(
            view.references[0].transforms,
            vec![
                Transform::EnvelopedSignature,
                Transform::Canonicalization(C14nMethod::Exclusive)
            ]
        );
        assert!(view.signature_value.is_empty());
    }

    #[test]
    fn test_unmarshall_reads_algorithms() {
        let xml = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"><ds:HMACOutputLength>160</ds:HMACOutputLength></ds:SignatureMethod><ds:Reference URI="#x"><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue>AAAA</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>
            QUJD
        </ds:SignatureValue><ds:KeyInfo><ds:KeyName>k1</ds:KeyName></ds:KeyInfo></ds:Signature>"##;
        let doc = ParserPool::new().parse(xml.as_bytes()).unwrap();
        let root = doc.borrow().document_element().unwrap();
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let id = unmarshall(&mut tree, &registry, &DomElement::new(doc, root)).unwrap();

        let signature = tree.payload::<Signature>(id).unwrap();
        assert_eq!(signature.signature_algorithm, SignatureAlgorithm::Hmac(HashFunction::Sha1));
        assert_eq!(signature.hmac_output_length, Some(160));
        assert_eq!(signature.signature_value.as_deref(), Some("QUJD"));
        assert_eq!(signature.references[0].target, ReferenceTarget::Uri("#x".to_string()));
        let key_info = tree.payload::<KeyInfo>(signature.key_info().unwrap()).unwrap();
        let key_name = tree.payload::<KeyName>(key_info.children()[0]).unwrap();
        assert_eq!(key_name.value.as_deref(), Some("k1"));
    }

    #[test]
    fn test_enveloped_reference_is_bound_to_owner() {
        let xml = r##"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="own" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"/><ds:Reference URI="#own"><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue>AAAA</ds:DigestValue></ds:Reference><ds:Reference URI="#elsewhere"><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue>AAAA</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>QUJD</ds:SignatureValue></ds:Signature></saml:Assertion>"##;
        let doc = ParserPool::new().parse(xml.as_bytes()).unwrap();
        let root = doc.borrow().document_element().unwrap();
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let assertion = unmarshall(&mut tree, &registry, &DomElement::new(doc, root)).unwrap();

        let signature = tree.signature_of(assertion).unwrap();
        let references = &tree.payload::<Signature>(signature).unwrap().references;
        assert_eq!(references[0].target, ReferenceTarget::Object(assertion));
        assert_eq!(references[1].target, ReferenceTarget::Uri("#elsewhere".to_string()));
    }

    #[test]
    fn test_unknown_signature_method_fails() {
        let xml = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="urn:made-up"/></ds:SignedInfo><ds:SignatureValue/></ds:Signature>"#;
        let doc = ParserPool::new().parse(xml.as_bytes()).unwrap();
        let root = doc.borrow().document_element().unwrap();
        let mut tree = XmlTree::new();
        let err = unmarshall(&mut tree, &ProviderRegistry::with_defaults(), &DomElement::new(doc, root)).unwrap_err();
        assert!(err.has_source());
        assert!(tree.is_empty());
    }
}
