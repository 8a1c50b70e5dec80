//! Element payloads and the closed set of object kinds
//!
//! Every concrete element type is a payload struct implementing
//! [`ElementPayload`]; the [`ObjectKind`] union enumerates them so that child
//! placement and dispatch are exhaustive matches rather than downcasts.
//! Optional behaviour is exposed through small capability traits
//! ([`IdBearing`], [`Signable`], [`AttributeExtensible`]).

use super::attribute_map::AttributeMap;
use super::tree::ObjectId;
use crate::error::UnmarshallingError;
use crate::namespaces::{ns, QName};
use crate::saml::{saml1, saml2, wssecurity};
use crate::xml::any::XsAny;
use crate::xmlsec::signature::{Exponent, KeyInfo, KeyName, KeyValue, Modulus, RsaKeyValue, Signature};
use std::fmt;

/// One attribute produced by [`ElementPayload::marshall_attributes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalledAttribute {
    /// Attribute name
    pub name: QName,
    /// Lexical value
    pub value: String,
    /// Whether the DOM attribute must be bound as an XML ID
    pub is_id: bool,
}

impl MarshalledAttribute {
    /// An unqualified, non-ID attribute
    pub fn new(local: &str, value: impl Into<String>) -> Self {
        Self {
            name: QName::local(local),
            value: value.into(),
            is_id: false,
        }
    }

    /// An attribute with an arbitrary name
    pub fn named(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            is_id: false,
        }
    }

    /// Mark the attribute as ID-typed
    pub fn id(mut self, is_id: bool) -> Self {
        self.is_id = is_id;
        self
    }
}

/// Append `local=value` when the value is present
pub(crate) fn push_attr<V: ToString>(out: &mut Vec<MarshalledAttribute>, local: &str, value: Option<V>) {
    if let Some(v) = value {
        out.push(MarshalledAttribute::new(local, v.to_string()));
    }
}

/// Outcome of offering a child to a parent payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPlacement {
    /// Stored in a free slot or appended to a list
    Placed,
    /// Stored in a single-valued slot, evicting the previous occupant
    Replaced(ObjectId),
    /// Not a legal child of this element
    Rejected,
}

/// Store a child in a single-valued slot
pub(crate) fn place_in_slot(slot: &mut Option<ObjectId>, child: ObjectId) -> ChildPlacement {
    match slot.replace(child) {
        Some(old) if old != child => ChildPlacement::Replaced(old),
        _ => ChildPlacement::Placed,
    }
}

/// Clear a slot if it holds `child`
pub(crate) fn take_from_slot(slot: &mut Option<ObjectId>, child: ObjectId) -> bool {
    if *slot == Some(child) {
        *slot = None;
        true
    } else {
        false
    }
}

/// Remove `child` from a child list
pub(crate) fn take_from_list(list: &mut Vec<ObjectId>, child: ObjectId) -> bool {
    let before = list.len();
    list.retain(|&c| c != child);
    list.len() != before
}

/// Per-element-type marshalling and unmarshalling hooks.
///
/// Defaults describe an empty element with no attributes, content or
/// children; each payload overrides what its schema type carries.
pub trait ElementPayload: fmt::Debug {
    /// Emit the typed attributes of this element
    fn marshall_attributes(&self, _out: &mut Vec<MarshalledAttribute>) {}

    /// Consume one DOM attribute; `Ok(false)` means "not one of mine"
    fn process_attribute(&mut self, _name: &QName, _value: &str) -> Result<bool, UnmarshallingError> {
        Ok(false)
    }

    /// Whether the named attribute is ID-typed for this element.
    ///
    /// Consulted after all attributes were processed, so the answer may
    /// depend on other attribute values.
    fn is_id_attribute(&self, _name: &QName) -> bool {
        false
    }

    /// Text content to marshall, if this element is content-bearing
    fn text_content(&self) -> Option<String> {
        None
    }

    /// Consume the (trimmed, non-empty) text content of the DOM element
    fn process_content(&mut self, _text: &str) -> Result<(), UnmarshallingError> {
        Ok(())
    }

    /// Children in schema order
    fn ordered_children(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Store a child object of the given kind
    fn place_child(&mut self, _child: ObjectId, _tag: ElementTag) -> ChildPlacement {
        ChildPlacement::Rejected
    }

    /// Forget a child object; returns whether it was held
    fn remove_child(&mut self, _child: ObjectId) -> bool {
        false
    }

    /// ID-attribute capability
    fn as_id_bearing(&self) -> Option<&dyn IdBearing> {
        None
    }

    /// Mutable ID-attribute capability
    fn as_id_bearing_mut(&mut self) -> Option<&mut dyn IdBearing> {
        None
    }

    /// Signature-carrying capability
    fn as_signable(&self) -> Option<&dyn Signable> {
        None
    }

    /// Open attribute capability
    fn as_attribute_extensible(&self) -> Option<&dyn AttributeExtensible> {
        None
    }

    /// Mutable open attribute capability
    fn as_attribute_extensible_mut(&mut self) -> Option<&mut dyn AttributeExtensible> {
        None
    }
}

/// Elements carrying an XML ID attribute
pub trait IdBearing {
    /// Current ID value
    fn xml_id(&self) -> Option<&str>;
    /// Replace the ID value
    fn set_xml_id(&mut self, id: Option<String>);
    /// Name of the ID attribute
    fn id_attribute_name(&self) -> QName {
        QName::local("ID")
    }
}

/// Elements that may carry an enveloped `ds:Signature` child
pub trait Signable {
    /// The signature child, if attached
    fn signature(&self) -> Option<ObjectId>;
}

/// Elements accepting arbitrary extra attributes
pub trait AttributeExtensible {
    /// Unknown attributes
    fn unknown_attributes(&self) -> &AttributeMap;
    /// Mutable unknown attributes
    fn unknown_attributes_mut(&mut self) -> &mut AttributeMap;
}

/// Typed access to one variant of [`ObjectKind`]
pub trait KindOf: ElementPayload + Default + Sized + 'static {
    /// The tag of this variant
    const TAG: ElementTag;
    /// Element name used by [`crate::xml::XmlTree::add`]
    fn default_element_name() -> QName;
    /// Borrow this variant out of a kind
    fn from_kind(kind: &ObjectKind) -> Option<&Self>;
    /// Mutably borrow this variant out of a kind
    fn from_kind_mut(kind: &mut ObjectKind) -> Option<&mut Self>;
    /// Wrap the payload
    fn into_kind(self) -> ObjectKind;
}

macro_rules! object_kinds {
    ($( $(#[$meta:meta])* $variant:ident($ty:ty) = ($ns:expr, $local:expr, $prefix:expr) ),* $(,)?) => {
        /// The closed set of element payloads
        #[derive(Debug)]
        pub enum ObjectKind {
            $( $(#[$meta])* $variant($ty), )*
        }

        /// Discriminant of [`ObjectKind`]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ElementTag {
            $( $(#[$meta])* $variant, )*
        }

        impl ObjectKind {
            /// The discriminant
            pub fn tag(&self) -> ElementTag {
                match self {
                    $( ObjectKind::$variant(_) => ElementTag::$variant, )*
                }
            }

            /// The payload as a trait object
            pub fn payload(&self) -> &dyn ElementPayload {
                match self {
                    $( ObjectKind::$variant(p) => p as &dyn ElementPayload, )*
                }
            }

            /// The payload as a mutable trait object
            pub fn payload_mut(&mut self) -> &mut dyn ElementPayload {
                match self {
                    $( ObjectKind::$variant(p) => p as &mut dyn ElementPayload, )*
                }
            }
        }

        $(
            impl KindOf for $ty {
                const TAG: ElementTag = ElementTag::$variant;

                fn default_element_name() -> QName {
                    QName::prefixed($ns, $local, $prefix)
                }

                fn from_kind(kind: &ObjectKind) -> Option<&Self> {
                    match kind {
                        ObjectKind::$variant(p) => Some(p),
                        _ => None,
                    }
                }

                fn from_kind_mut(kind: &mut ObjectKind) -> Option<&mut Self> {
                    match kind {
                        ObjectKind::$variant(p) => Some(p),
                        _ => None,
                    }
                }

                fn into_kind(self) -> ObjectKind {
                    ObjectKind::$variant(self)
                }
            }

            impl From<$ty> for ObjectKind {
                fn from(payload: $ty) -> Self {
                    ObjectKind::$variant(payload)
                }
            }
        )*

        /// Default element name and constructor of every built-in kind
        pub(crate) fn builtin_kinds() -> Vec<(QName, fn() -> ObjectKind)> {
            vec![
                $( (
                    QName::prefixed($ns, $local, $prefix),
                    (|| ObjectKind::$variant(<$ty>::default())) as fn() -> ObjectKind,
                ), )*
            ]
        }
    };
}

object_kinds! {
    /// Generic content (`xs:anyType`), by default `saml:AttributeValue`
    Any(XsAny) = (ns::SAML2, "AttributeValue", ns::SAML_PREFIX),

    /// `saml:Assertion` (2.0)
    Assertion(saml2::Assertion) = (ns::SAML2, "Assertion", ns::SAML_PREFIX),
    /// `saml:Issuer`
    Issuer(saml2::Issuer) = (ns::SAML2, "Issuer", ns::SAML_PREFIX),
    /// `saml:NameID`
    NameId(saml2::NameId) = (ns::SAML2, "NameID", ns::SAML_PREFIX),
    /// `saml:Subject`
    Subject(saml2::Subject) = (ns::SAML2, "Subject", ns::SAML_PREFIX),
    /// `saml:SubjectConfirmation`
    SubjectConfirmation(saml2::SubjectConfirmation) = (ns::SAML2, "SubjectConfirmation", ns::SAML_PREFIX),
    /// `saml:SubjectConfirmationData`
    SubjectConfirmationData(saml2::SubjectConfirmationData) = (ns::SAML2, "SubjectConfirmationData", ns::SAML_PREFIX),
    /// `saml:Conditions` (2.0)
    Conditions(saml2::Conditions) = (ns::SAML2, "Conditions", ns::SAML_PREFIX),
    /// `saml:AudienceRestriction`
    AudienceRestriction(saml2::AudienceRestriction) = (ns::SAML2, "AudienceRestriction", ns::SAML_PREFIX),
    /// `saml:Audience` (2.0)
    Audience(saml2::Audience) = (ns::SAML2, "Audience", ns::SAML_PREFIX),
    /// `saml:OneTimeUse`
    OneTimeUse(saml2::OneTimeUse) = (ns::SAML2, "OneTimeUse", ns::SAML_PREFIX),
    /// `saml:ProxyRestriction`
    ProxyRestriction(saml2::ProxyRestriction) = (ns::SAML2, "ProxyRestriction", ns::SAML_PREFIX),
    /// `saml:AuthnStatement`
    AuthnStatement(saml2::AuthnStatement) = (ns::SAML2, "AuthnStatement", ns::SAML_PREFIX),
    /// `saml:AttributeStatement`
    AttributeStatement(saml2::AttributeStatement) = (ns::SAML2, "AttributeStatement", ns::SAML_PREFIX),
    /// `saml:Attribute`
    Attribute(saml2::Attribute) = (ns::SAML2, "Attribute", ns::SAML_PREFIX),
    /// `samlp:Response`
    Response(saml2::Response) = (ns::SAML2P, "Response", ns::SAMLP_PREFIX),
    /// `samlp:Status`
    Status(saml2::Status) = (ns::SAML2P, "Status", ns::SAMLP_PREFIX),
    /// `samlp:StatusCode`
    StatusCode(saml2::StatusCode) = (ns::SAML2P, "StatusCode", ns::SAMLP_PREFIX),
    /// `samlp:StatusMessage`
    StatusMessage(saml2::StatusMessage) = (ns::SAML2P, "StatusMessage", ns::SAMLP_PREFIX),

    /// `saml:Assertion` (1.x)
    Saml1Assertion(saml1::Saml1Assertion) = (ns::SAML1, "Assertion", ns::SAML_PREFIX),
    /// `saml:Conditions` (1.x)
    Saml1Conditions(saml1::Saml1Conditions) = (ns::SAML1, "Conditions", ns::SAML_PREFIX),
    /// `saml:AudienceRestrictionCondition`
    AudienceRestrictionCondition(saml1::AudienceRestrictionCondition) = (ns::SAML1, "AudienceRestrictionCondition", ns::SAML_PREFIX),
    /// `saml:Audience` (1.x)
    Saml1Audience(saml1::Saml1Audience) = (ns::SAML1, "Audience", ns::SAML_PREFIX),
    /// `saml:DoNotCacheCondition`
    DoNotCacheCondition(saml1::DoNotCacheCondition) = (ns::SAML1, "DoNotCacheCondition", ns::SAML_PREFIX),
    /// `saml:AuthorizationDecisionStatement`
    AuthorizationDecisionStatement(saml1::AuthorizationDecisionStatement) = (ns::SAML1, "AuthorizationDecisionStatement", ns::SAML_PREFIX),
    /// `saml:Action`
    Action(saml1::Action) = (ns::SAML1, "Action", ns::SAML_PREFIX),
    /// `samlp:Response` (1.x)
    Saml1Response(saml1::Saml1Response) = (ns::SAML1P, "Response", ns::SAMLP_PREFIX),
    /// `samlp:Status` (1.x)
    Saml1Status(saml1::Saml1Status) = (ns::SAML1P, "Status", ns::SAMLP_PREFIX),
    /// `samlp:StatusCode` (1.x)
    Saml1StatusCode(saml1::Saml1StatusCode) = (ns::SAML1P, "StatusCode", ns::SAMLP_PREFIX),

    /// `ds:Signature`
    Signature(Signature) = (ns::DSIG, "Signature", ns::DSIG_PREFIX),
    /// `ds:KeyInfo`
    KeyInfo(KeyInfo) = (ns::DSIG, "KeyInfo", ns::DSIG_PREFIX),
    /// `ds:KeyName`
    KeyName(KeyName) = (ns::DSIG, "KeyName", ns::DSIG_PREFIX),
    /// `ds:KeyValue`
    KeyValue(KeyValue) = (ns::DSIG, "KeyValue", ns::DSIG_PREFIX),
    /// `ds:RSAKeyValue`
    RsaKeyValue(RsaKeyValue) = (ns::DSIG, "RSAKeyValue", ns::DSIG_PREFIX),
    /// `ds:Modulus`
    Modulus(Modulus) = (ns::DSIG, "Modulus", ns::DSIG_PREFIX),
    /// `ds:Exponent`
    Exponent(Exponent) = (ns::DSIG, "Exponent", ns::DSIG_PREFIX),

    /// `wsu:Timestamp`
    Timestamp(wssecurity::Timestamp) = (ns::WSU, "Timestamp", ns::WSU_PREFIX),
    /// `wsu:Created`
    Created(wssecurity::Created) = (ns::WSU, "Created", ns::WSU_PREFIX),
    /// `wsu:Expires`
    Expires(wssecurity::Expires) = (ns::WSU, "Expires", ns::WSU_PREFIX),
}
