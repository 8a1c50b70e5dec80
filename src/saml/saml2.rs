//! SAML 2.0 assertion and protocol bindings

use super::{format_instant, instant_attribute, unqualified, SamlVersion};
use crate::error::UnmarshallingError;
use crate::namespaces::QName;
use crate::xml::attribute_map::AttributeMap;
use crate::xml::kind::{
    place_in_slot, push_attr, take_from_list, take_from_slot, AttributeExtensible, ChildPlacement,
    ElementPayload, ElementTag, IdBearing, MarshalledAttribute, Signable,
};
use crate::xml::tree::ObjectId;
use chrono::{DateTime, Utc};

/// Subject confirmation method URIs
pub mod confirmation_method {
    /// Bearer
    pub const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
    /// Sender-vouches
    pub const SENDER_VOUCHES: &str = "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches";
    /// Holder-of-key
    pub const HOLDER_OF_KEY: &str = "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key";
}

/// Top-level status code URIs
pub mod status_code {
    /// Success
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// Requester error
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// Responder error
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
    /// Version mismatch
    pub const VERSION_MISMATCH: &str = "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch";
}

fn parse_version(value: &str) -> Result<Option<SamlVersion>, UnmarshallingError> {
    value
        .parse()
        .map(Some)
        .map_err(|e| UnmarshallingError::new("invalid Version attribute").with_source(e))
}

fn instant_value(instant: &Option<DateTime<Utc>>) -> Option<String> {
    instant.as_ref().map(format_instant)
}

/// `saml:Assertion`
#[derive(Debug, Default)]
pub struct Assertion {
    /// `ID`
    pub id: Option<String>,
    /// `Version`
    pub version: Option<SamlVersion>,
    /// `IssueInstant`
    pub issue_instant: Option<DateTime<Utc>>,
    issuer: Option<ObjectId>,
    signature: Option<ObjectId>,
    subject: Option<ObjectId>,
    conditions: Option<ObjectId>,
    statements: Vec<ObjectId>,
}

impl Assertion {
    /// A version 2.0 assertion with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            version: Some(SamlVersion::V20),
            ..Self::default()
        }
    }

    /// Set `IssueInstant`
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    /// `saml:Issuer` child
    pub fn issuer(&self) -> Option<ObjectId> {
        self.issuer
    }

    /// `ds:Signature` child
    pub fn signature(&self) -> Option<ObjectId> {
        self.signature
    }

    /// `saml:Subject` child
    pub fn subject(&self) -> Option<ObjectId> {
        self.subject
    }

    /// `saml:Conditions` child
    pub fn conditions(&self) -> Option<ObjectId> {
        self.conditions
    }

    /// Statement children
    pub fn statements(&self) -> &[ObjectId] {
        &self.statements
    }
}

impl ElementPayload for Assertion {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Version", self.version);
        if let Some(id) = &self.id {
            out.push(MarshalledAttribute::new("ID", id.clone()).id(true));
        }
        push_attr(out, "IssueInstant", instant_value(&self.issue_instant));
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("ID") => self.id = Some(value.to_string()),
            Some("Version") => self.version = parse_version(value)?,
            Some("IssueInstant") => self.issue_instant = instant_attribute("IssueInstant", value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn is_id_attribute(&self, name: &QName) -> bool {
        unqualified(name) == Some("ID")
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        let mut children: Vec<ObjectId> = [self.issuer, self.signature, self.subject, self.conditions]
            .into_iter()
            .flatten()
            .collect();
        children.extend(&self.statements);
        children
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Issuer => place_in_slot(&mut self.issuer, child),
            ElementTag::Signature => place_in_slot(&mut self.signature, child),
            ElementTag::Subject => place_in_slot(&mut self.subject, child),
            ElementTag::Conditions => place_in_slot(&mut self.conditions, child),
            ElementTag::AuthnStatement | ElementTag::AttributeStatement => {
                self.statements.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.issuer, child)
            || take_from_slot(&mut self.signature, child)
            || take_from_slot(&mut self.subject, child)
            || take_from_slot(&mut self.conditions, child)
            || take_from_list(&mut self.statements, child)
    }

    fn as_id_bearing(&self) -> Option<&dyn IdBearing> {
        Some(self)
    }

    fn as_id_bearing_mut(&mut self) -> Option<&mut dyn IdBearing> {
        Some(self)
    }

    fn as_signable(&self) -> Option<&dyn Signable> {
        Some(self)
    }
}

impl IdBearing for Assertion {
    fn xml_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_xml_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}

impl Signable for Assertion {
    fn signature(&self) -> Option<ObjectId> {
        self.signature
    }
}

macro_rules! name_id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Element content
            pub value: Option<String>,
            /// `Format`
            pub format: Option<String>,
            /// `NameQualifier`
            pub name_qualifier: Option<String>,
            /// `SPNameQualifier`
            pub sp_name_qualifier: Option<String>,
            /// `SPProvidedID`
            pub sp_provided_id: Option<String>,
        }

        impl $name {
            /// An element with the given content
            pub fn new(value: impl Into<String>) -> Self {
                Self {
                    value: Some(value.into()),
                    ..Self::default()
                }
            }

            /// Set `Format`
            pub fn with_format(mut self, format: impl Into<String>) -> Self {
                self.format = Some(format.into());
                self
            }
        }

        impl ElementPayload for $name {
            fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
                push_attr(out, "NameQualifier", self.name_qualifier.as_ref());
                push_attr(out, "SPNameQualifier", self.sp_name_qualifier.as_ref());
                push_attr(out, "Format", self.format.as_ref());
                push_attr(out, "SPProvidedID", self.sp_provided_id.as_ref());
            }

            fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
                let slot = match unqualified(name) {
                    Some("NameQualifier") => &mut self.name_qualifier,
                    Some("SPNameQualifier") => &mut self.sp_name_qualifier,
                    Some("Format") => &mut self.format,
                    Some("SPProvidedID") => &mut self.sp_provided_id,
                    _ => return Ok(false),
                };
                *slot = Some(value.to_string());
                Ok(true)
            }

            fn text_content(&self) -> Option<String> {
                self.value.clone()
            }

            fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
                self.value = Some(text.to_string());
                Ok(())
            }
        }
    };
}

name_id_type! {
    /// `saml:Issuer`
    Issuer
}

name_id_type! {
    /// `saml:NameID`
    NameId
}

/// `saml:Subject`
#[derive(Debug, Default)]
pub struct Subject {
    name_id: Option<ObjectId>,
    confirmations: Vec<ObjectId>,
}

impl Subject {
    /// `saml:NameID` child
    pub fn name_id(&self) -> Option<ObjectId> {
        self.name_id
    }

    /// `saml:SubjectConfirmation` children
    pub fn confirmations(&self) -> &[ObjectId] {
        &self.confirmations
    }
}

impl ElementPayload for Subject {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.name_id.into_iter().chain(self.confirmations.iter().copied()).collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::NameId => place_in_slot(&mut self.name_id, child),
            ElementTag::SubjectConfirmation => {
                self.confirmations.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.name_id, child) || take_from_list(&mut self.confirmations, child)
    }
}

/// `saml:SubjectConfirmation`
#[derive(Debug, Default)]
pub struct SubjectConfirmation {
    /// `Method`
    pub method: Option<String>,
    name_id: Option<ObjectId>,
    data: Option<ObjectId>,
}

impl SubjectConfirmation {
    /// A confirmation using the given method URI
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    /// `saml:NameID` child
    pub fn name_id(&self) -> Option<ObjectId> {
        self.name_id
    }

    /// `saml:SubjectConfirmationData` child
    pub fn data(&self) -> Option<ObjectId> {
        self.data
    }
}

impl ElementPayload for SubjectConfirmation {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Method", self.method.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        if unqualified(name) == Some("Method") {
            self.method = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.name_id.into_iter().chain(self.data).collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::NameId => place_in_slot(&mut self.name_id, child),
            ElementTag::SubjectConfirmationData => place_in_slot(&mut self.data, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.name_id, child) || take_from_slot(&mut self.data, child)
    }
}

/// `saml:SubjectConfirmationData`
#[derive(Debug, Default)]
pub struct SubjectConfirmationData {
    /// `NotBefore`
    pub not_before: Option<DateTime<Utc>>,
    /// `NotOnOrAfter`
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// `Recipient`
    pub recipient: Option<String>,
    /// `InResponseTo`
    pub in_response_to: Option<String>,
    /// `Address`
    pub address: Option<String>,
    /// Extension attributes
    pub attributes: AttributeMap,
    /// Child elements
    pub children: Vec<ObjectId>,
}

impl SubjectConfirmationData {
    /// Key material and other extension children
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }
}

impl ElementPayload for SubjectConfirmationData {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "NotBefore", instant_value(&self.not_before));
        push_attr(out, "NotOnOrAfter", instant_value(&self.not_on_or_after));
        push_attr(out, "Recipient", self.recipient.as_ref());
        push_attr(out, "InResponseTo", self.in_response_to.as_ref());
        push_attr(out, "Address", self.address.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("NotBefore") => self.not_before = instant_attribute("NotBefore", value)?,
            Some("NotOnOrAfter") => self.not_on_or_after = instant_attribute("NotOnOrAfter", value)?,
            Some("Recipient") => self.recipient = Some(value.to_string()),
            Some("InResponseTo") => self.in_response_to = Some(value.to_string()),
            Some("Address") => self.address = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.children.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::KeyInfo | ElementTag::Any => {
                self.children.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.children, child)
    }

    fn as_attribute_extensible(&self) -> Option<&dyn AttributeExtensible> {
        Some(self)
    }

    fn as_attribute_extensible_mut(&mut self) -> Option<&mut dyn AttributeExtensible> {
        Some(self)
    }
}

impl AttributeExtensible for SubjectConfirmationData {
    fn unknown_attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn unknown_attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }
}

/// `saml:Conditions`
#[derive(Debug, Default)]
pub struct Conditions {
    /// `NotBefore`
    pub not_before: Option<DateTime<Utc>>,
    /// `NotOnOrAfter`
    pub not_on_or_after: Option<DateTime<Utc>>,
    conditions: Vec<ObjectId>,
}

impl Conditions {
    /// Conditions bounded by the given window
    pub fn between(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(not_before),
            not_on_or_after: Some(not_on_or_after),
            ..Self::default()
        }
    }

    /// Individual condition children
    pub fn conditions(&self) -> &[ObjectId] {
        &self.conditions
    }
}

impl ElementPayload for Conditions {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "NotBefore", instant_value(&self.not_before));
        push_attr(out, "NotOnOrAfter", instant_value(&self.not_on_or_after));
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("NotBefore") => self.not_before = instant_attribute("NotBefore", value)?,
            Some("NotOnOrAfter") => self.not_on_or_after = instant_attribute("NotOnOrAfter", value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.conditions.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::AudienceRestriction
            | ElementTag::OneTimeUse
            | ElementTag::ProxyRestriction
            | ElementTag::Any => {
                self.conditions.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.conditions, child)
    }
}

/// `saml:AudienceRestriction`
#[derive(Debug, Default)]
pub struct AudienceRestriction {
    audiences: Vec<ObjectId>,
}

impl AudienceRestriction {
    /// `saml:Audience` children
    pub fn audiences(&self) -> &[ObjectId] {
        &self.audiences
    }
}

impl ElementPayload for AudienceRestriction {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.audiences.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Audience {
            return ChildPlacement::Rejected;
        }
        self.audiences.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.audiences, child)
    }
}

/// `saml:Audience`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Audience {
    /// Audience URI
    pub uri: Option<String>,
}

impl Audience {
    /// An audience element for the given URI
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: Some(uri.into()) }
    }
}

impl ElementPayload for Audience {
    fn text_content(&self) -> Option<String> {
        self.uri.clone()
    }

    fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
        self.uri = Some(text.to_string());
        Ok(())
    }
}

/// `saml:OneTimeUse`
#[derive(Debug, Default, Clone, Copy)]
pub struct OneTimeUse;

impl ElementPayload for OneTimeUse {}

/// `saml:ProxyRestriction`
#[derive(Debug, Default)]
pub struct ProxyRestriction {
    /// `Count`
    pub count: Option<u32>,
    audiences: Vec<ObjectId>,
}

impl ProxyRestriction {
    /// `saml:Audience` children
    pub fn audiences(&self) -> &[ObjectId] {
        &self.audiences
    }
}

impl ElementPayload for ProxyRestriction {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Count", self.count);
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        if unqualified(name) != Some("Count") {
            return Ok(false);
        }
        let count = value.trim().parse().map_err(|e| {
            UnmarshallingError::new(format!("invalid Count attribute '{}'", value)).with_source(e)
        })?;
        self.count = Some(count);
        Ok(true)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.audiences.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Audience {
            return ChildPlacement::Rejected;
        }
        self.audiences.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.audiences, child)
    }
}

/// `saml:AuthnStatement`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    /// `AuthnInstant`
    pub authn_instant: Option<DateTime<Utc>>,
    /// `SessionIndex`
    pub session_index: Option<String>,
    /// `SessionNotOnOrAfter`
    pub session_not_on_or_after: Option<DateTime<Utc>>,
}

impl ElementPayload for AuthnStatement {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "AuthnInstant", instant_value(&self.authn_instant));
        push_attr(out, "SessionIndex", self.session_index.as_ref());
        push_attr(out, "SessionNotOnOrAfter", instant_value(&self.session_not_on_or_after));
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("AuthnInstant") => self.authn_instant = instant_attribute("AuthnInstant", value)?,
            Some("SessionIndex") => self.session_index = Some(value.to_string()),
            Some("SessionNotOnOrAfter") => {
                self.session_not_on_or_after = instant_attribute("SessionNotOnOrAfter", value)?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// `saml:AttributeStatement`
#[derive(Debug, Default)]
pub struct AttributeStatement {
    attributes: Vec<ObjectId>,
}

impl AttributeStatement {
    /// `saml:Attribute` children
    pub fn attributes(&self) -> &[ObjectId] {
        &self.attributes
    }
}

impl ElementPayload for AttributeStatement {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.attributes.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Attribute {
            return ChildPlacement::Rejected;
        }
        self.attributes.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.attributes, child)
    }
}

/// `saml:Attribute`
#[derive(Debug, Default)]
pub struct Attribute {
    /// `Name`
    pub name: Option<String>,
    /// `NameFormat`
    pub name_format: Option<String>,
    /// `FriendlyName`
    pub friendly_name: Option<String>,
    /// Extension attributes
    pub attributes: AttributeMap,
    values: Vec<ObjectId>,
}

impl Attribute {
    /// An attribute with the given `Name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// `saml:AttributeValue` children
    pub fn values(&self) -> &[ObjectId] {
        &self.values
    }
}

impl ElementPayload for Attribute {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Name", self.name.as_ref());
        push_attr(out, "NameFormat", self.name_format.as_ref());
        push_attr(out, "FriendlyName", self.friendly_name.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        let slot = match unqualified(name) {
            Some("Name") => &mut self.name,
            Some("NameFormat") => &mut self.name_format,
            Some("FriendlyName") => &mut self.friendly_name,
            _ => return Ok(false),
        };
        *slot = Some(value.to_string());
        Ok(true)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.values.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Any {
            return ChildPlacement::Rejected;
        }
        self.values.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.values, child)
    }

    fn as_attribute_extensible(&self) -> Option<&dyn AttributeExtensible> {
        Some(self)
    }

    fn as_attribute_extensible_mut(&mut self) -> Option<&mut dyn AttributeExtensible> {
        Some(self)
    }
}

impl AttributeExtensible for Attribute {
    fn unknown_attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn unknown_attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }
}

/// `samlp:Response`
#[derive(Debug, Default)]
pub struct Response {
    /// `ID`
    pub id: Option<String>,
    /// `InResponseTo`
    pub in_response_to: Option<String>,
    /// `Version`
    pub version: Option<SamlVersion>,
    /// `IssueInstant`
    pub issue_instant: Option<DateTime<Utc>>,
    /// `Destination`
    pub destination: Option<String>,
    /// `Consent`
    pub consent: Option<String>,
    issuer: Option<ObjectId>,
    signature: Option<ObjectId>,
    status: Option<ObjectId>,
    assertions: Vec<ObjectId>,
}

impl Response {
    /// A version 2.0 response with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            version: Some(SamlVersion::V20),
            ..Self::default()
        }
    }

    /// `saml:Issuer` child
    pub fn issuer(&self) -> Option<ObjectId> {
        self.issuer
    }

    /// `ds:Signature` child
    pub fn signature(&self) -> Option<ObjectId> {
        self.signature
    }

    /// `samlp:Status` child
    pub fn status(&self) -> Option<ObjectId> {
        self.status
    }

    /// `saml:Assertion` children
    pub fn assertions(&self) -> &[ObjectId] {
        &self.assertions
    }
}

impl ElementPayload for Response {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        if let Some(id) = &self.id {
            out.push(MarshalledAttribute::new("ID", id.clone()).id(true));
        }
        push_attr(out, "InResponseTo", self.in_response_to.as_ref());
        push_attr(out, "Version", self.version);
        push_attr(out, "IssueInstant", instant_value(&self.issue_instant));
        push_attr(out, "Destination", self.destination.as_ref());
        push_attr(out, "Consent", self.consent.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("ID") => self.id = Some(value.to_string()),
            Some("InResponseTo") => self.in_response_to = Some(value.to_string()),
            Some("Version") => self.version = parse_version(value)?,
            Some("IssueInstant") => self.issue_instant = instant_attribute("IssueInstant", value)?,
            Some("Destination") => self.destination = Some(value.to_string()),
            Some("Consent") => self.consent = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn is_id_attribute(&self, name: &QName) -> bool {
        unqualified(name) == Some("ID")
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        let mut children: Vec<ObjectId> =
            [self.issuer, self.signature, self.status].into_iter().flatten().collect();
        children.extend(&self.assertions);
        children
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Issuer => place_in_slot(&mut self.issuer, child),
            ElementTag::Signature => place_in_slot(&mut self.signature, child),
            ElementTag::Status => place_in_slot(&mut self.status, child),
            ElementTag::Assertion => {
                self.assertions.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.issuer, child)
            || take_from_slot(&mut self.signature, child)
            || take_from_slot(&mut self.status, child)
            || take_from_list(&mut self.assertions, child)
    }

    fn as_id_bearing(&self) -> Option<&dyn IdBearing> {
        Some(self)
    }

    fn as_id_bearing_mut(&mut self) -> Option<&mut dyn IdBearing> {
        Some(self)
    }

    fn as_signable(&self) -> Option<&dyn Signable> {
        Some(self)
    }
}

impl IdBearing for Response {
    fn xml_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_xml_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}

impl Signable for Response {
    fn signature(&self) -> Option<ObjectId> {
        self.signature
    }
}

/// `samlp:Status`
#[derive(Debug, Default)]
pub struct Status {
    code: Option<ObjectId>,
    message: Option<ObjectId>,
}

impl Status {
    /// `samlp:StatusCode` child
    pub fn code(&self) -> Option<ObjectId> {
        self.code
    }

    /// `samlp:StatusMessage` child
    pub fn message(&self) -> Option<ObjectId> {
        self.message
    }
}

impl ElementPayload for Status {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.code.into_iter().chain(self.message).collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::StatusCode => place_in_slot(&mut self.code, child),
            ElementTag::StatusMessage => place_in_slot(&mut self.message, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.code, child) || take_from_slot(&mut self.message, child)
    }
}

/// `samlp:StatusCode`, possibly nesting a second-level code
#[derive(Debug, Default)]
pub struct StatusCode {
    /// `Value`
    pub value: Option<String>,
    nested: Option<ObjectId>,
}

impl StatusCode {
    /// A status code with the given value URI
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            nested: None,
        }
    }

    /// Nested `samlp:StatusCode`
    pub fn nested(&self) -> Option<ObjectId> {
        self.nested
    }
}

impl ElementPayload for StatusCode {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Value", self.value.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        if unqualified(name) == Some("Value") {
            self.value = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.nested.into_iter().collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::StatusCode => place_in_slot(&mut self.nested, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.nested, child)
    }
}

/// `samlp:StatusMessage`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Message text
    pub message: Option<String>,
}

impl ElementPayload for StatusMessage {
    fn text_content(&self) -> Option<String> {
        self.message.clone()
    }

    fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
        self.message = Some(text.to_string());
        Ok(())
    }
}
