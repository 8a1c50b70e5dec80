//! SAML 1.x assertion and response bindings

use super::{format_instant, instant_attribute, unqualified, SamlVersion};
use crate::error::UnmarshallingError;
use crate::namespaces::QName;
use crate::xml::kind::{
    place_in_slot, push_attr, take_from_list, take_from_slot, ChildPlacement, ElementPayload,
    ElementTag, IdBearing, MarshalledAttribute, Signable,
};
use crate::xml::tree::ObjectId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// `saml:Assertion` (1.0 / 1.1)
#[derive(Debug, Default)]
pub struct Saml1Assertion {
    /// `AssertionID`
    pub id: Option<String>,
    /// Version from `MajorVersion` / `MinorVersion`
    pub version: Option<SamlVersion>,
    /// `Issuer`
    pub issuer: Option<String>,
    /// `IssueInstant`
    pub issue_instant: Option<DateTime<Utc>>,
    conditions: Option<ObjectId>,
    statements: Vec<ObjectId>,
    signature: Option<ObjectId>,
}

impl Saml1Assertion {
    /// An assertion with the given ID and version
    pub fn new(id: impl Into<String>, version: SamlVersion) -> Self {
        Self {
            id: Some(id.into()),
            version: Some(version),
            ..Self::default()
        }
    }

    /// `AssertionID` is only an XML ID from 1.1 on; unknown versions are
    /// treated as 1.1
    fn id_is_typed(&self) -> bool {
        self.version != Some(SamlVersion::V10)
    }

    /// `saml:Conditions` child
    pub fn conditions(&self) -> Option<ObjectId> {
        self.conditions
    }

    /// Statement children
    pub fn statements(&self) -> &[ObjectId] {
        &self.statements
    }

    /// `ds:Signature` child
    pub fn signature(&self) -> Option<ObjectId> {
        self.signature
    }
}

fn parse_version_number(attribute: &str, value: &str) -> Result<u32, UnmarshallingError> {
    value.trim().parse().map_err(|e| {
        UnmarshallingError::new(format!("{} '{}' is not a valid integer", attribute, value))
            .with_source(e)
    })
}

fn marshall_version(version: Option<SamlVersion>, out: &mut Vec<MarshalledAttribute>) {
    if let Some(version) = version {
        out.push(MarshalledAttribute::new("MajorVersion", version.major().to_string()));
        out.push(MarshalledAttribute::new("MinorVersion", version.minor().to_string()));
    }
}

/// Consume `MajorVersion` or `MinorVersion`; `Ok(false)` for any other attribute
fn process_version(version: &mut Option<SamlVersion>, local: &str, value: &str) -> Result<bool, UnmarshallingError> {
    match local {
        "MajorVersion" => {
            let major = parse_version_number("MajorVersion", value)?;
            if major != 1 {
                return Err(UnmarshallingError::new(format!(
                    "unsupported SAML 1.x major version {}",
                    major
                )));
            }
        }
        "MinorVersion" => {
            *version = match parse_version_number("MinorVersion", value)? {
                0 => Some(SamlVersion::V10),
                1 => Some(SamlVersion::V11),
                other => {
                    return Err(UnmarshallingError::new(format!(
                        "unsupported SAML 1.x minor version {}",
                        other
                    )))
                }
            };
        }
        _ => return Ok(false),
    }
    Ok(true)
}

impl ElementPayload for Saml1Assertion {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        marshall_version(self.version, out);
        if let Some(id) = &self.id {
            out.push(MarshalledAttribute::new("AssertionID", id.clone()).id(self.id_is_typed()));
        }
        push_attr(out, "Issuer", self.issuer.as_ref());
        push_attr(out, "IssueInstant", self.issue_instant.as_ref().map(format_instant));
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        let Some(local) = unqualified(name) else {
            return Ok(false);
        };
        if process_version(&mut self.version, local, value)? {
            return Ok(true);
        }
        match local {
            "AssertionID" => self.id = Some(value.to_string()),
            "Issuer" => self.issuer = Some(value.to_string()),
            "IssueInstant" => self.issue_instant = instant_attribute("IssueInstant", value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn is_id_attribute(&self, name: &QName) -> bool {
        unqualified(name) == Some("AssertionID") && self.id_is_typed()
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        let mut children: Vec<ObjectId> = self.conditions.into_iter().collect();
        children.extend(&self.statements);
        children.extend(self.signature);
        children
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Saml1Conditions => place_in_slot(&mut self.conditions, child),
            ElementTag::Signature => place_in_slot(&mut self.signature, child),
            ElementTag::AuthorizationDecisionStatement => {
                self.statements.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.conditions, child)
            || take_from_slot(&mut self.signature, child)
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

impl IdBearing for Saml1Assertion {
    fn xml_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_xml_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn id_attribute_name(&self) -> QName {
        QName::local("AssertionID")
    }
}

impl Signable for Saml1Assertion {
    fn signature(&self) -> Option<ObjectId> {
        self.signature
    }
}

/// `samlp:Response` (1.0 / 1.1)
#[derive(Debug, Default)]
pub struct Saml1Response {
    /// `ResponseID`
    pub id: Option<String>,
    /// `InResponseTo`
    pub in_response_to: Option<String>,
    /// Version from `MajorVersion` / `MinorVersion`
    pub version: Option<SamlVersion>,
    /// `IssueInstant`
    pub issue_instant: Option<DateTime<Utc>>,
    /// `Recipient`
    pub recipient: Option<String>,
    signature: Option<ObjectId>,
    status: Option<ObjectId>,
    assertions: Vec<ObjectId>,
}

impl Saml1Response {
    /// A response with the given ID and version
    pub fn new(id: impl Into<String>, version: SamlVersion) -> Self {
        Self {
            id: Some(id.into()),
            version: Some(version),
            ..Self::default()
        }
    }

    fn id_is_typed(&self) -> bool {
        self.version != Some(SamlVersion::V10)
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

impl ElementPayload for Saml1Response {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        marshall_version(self.version, out);
        if let Some(id) = &self.id {
            out.push(MarshalledAttribute::new("ResponseID", id.clone()).id(self.id_is_typed()));
        }
        push_attr(out, "InResponseTo", self.in_response_to.as_ref());
        push_attr(out, "IssueInstant", self.issue_instant.as_ref().map(format_instant));
        push_attr(out, "Recipient", self.recipient.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        let Some(local) = unqualified(name) else {
            return Ok(false);
        };
        if process_version(&mut self.version, local, value)? {
            return Ok(true);
        }
        match local {
            "ResponseID" => self.id = Some(value.to_string()),
            "InResponseTo" => self.in_response_to = Some(value.to_string()),
            "IssueInstant" => self.issue_instant = instant_attribute("IssueInstant", value)?,
            "Recipient" => self.recipient = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn is_id_attribute(&self, name: &QName) -> bool {
        unqualified(name) == Some("ResponseID") && self.id_is_typed()
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        let mut children: Vec<ObjectId> = self.signature.into_iter().chain(self.status).collect();
        children.extend(&self.assertions);
        children
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Signature => place_in_slot(&mut self.signature, child),
            ElementTag::Saml1Status => place_in_slot(&mut self.status, child),
            ElementTag::Saml1Assertion => {
                self.assertions.push(child);
                ChildPlacement::Placed
            }
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.signature, child)
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

impl IdBearing for Saml1Response {
    fn xml_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_xml_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn id_attribute_name(&self) -> QName {
        QName::local("ResponseID")
    }
}

impl Signable for Saml1Response {
    fn signature(&self) -> Option<ObjectId> {
        self.signature
    }
}

/// `samlp:Status` (1.x)
#[derive(Debug, Default)]
pub struct Saml1Status {
    code: Option<ObjectId>,
}

impl Saml1Status {
    /// `samlp:StatusCode` child
    pub fn code(&self) -> Option<ObjectId> {
        self.code
    }
}

impl ElementPayload for Saml1Status {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.code.into_iter().collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Saml1StatusCode => place_in_slot(&mut self.code, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.code, child)
    }
}

/// `samlp:StatusCode` (1.x); `Value` is a QName such as `samlp:Success`
#[derive(Debug, Default)]
pub struct Saml1StatusCode {
    /// `Value`, kept lexically
    pub value: Option<String>,
    nested: Option<ObjectId>,
}

impl Saml1StatusCode {
    /// A status code with the given lexical QName
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

impl ElementPayload for Saml1StatusCode {
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
            ElementTag::Saml1StatusCode => place_in_slot(&mut self.nested, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.nested, child)
    }
}

/// `saml:Conditions` (1.x)
#[derive(Debug, Default)]
pub struct Saml1Conditions {
    /// `NotBefore`
    pub not_before: Option<DateTime<Utc>>,
    /// `NotOnOrAfter`
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub(crate) conditions: Vec<ObjectId>,
}

impl Saml1Conditions {
    /// Individual condition children
    pub fn conditions(&self) -> &[ObjectId] {
        &self.conditions
    }
}

impl ElementPayload for Saml1Conditions {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "NotBefore", self.not_before.as_ref().map(format_instant));
        push_attr(out, "NotOnOrAfter", self.not_on_or_after.as_ref().map(format_instant));
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
            ElementTag::AudienceRestrictionCondition | ElementTag::DoNotCacheCondition | ElementTag::Any => {
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

/// `saml:AudienceRestrictionCondition`
#[derive(Debug, Default)]
pub struct AudienceRestrictionCondition {
    audiences: Vec<ObjectId>,
}

impl AudienceRestrictionCondition {
    /// `saml:Audience` children
    pub fn audiences(&self) -> &[ObjectId] {
        &self.audiences
    }
}

impl ElementPayload for AudienceRestrictionCondition {
    fn ordered_children(&self) -> Vec<ObjectId> {
        self.audiences.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Saml1Audience {
            return ChildPlacement::Rejected;
        }
        self.audiences.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.audiences, child)
    }
}

/// `saml:Audience` (1.x)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Saml1Audience {
    /// Audience URI
    pub uri: Option<String>,
}

impl Saml1Audience {
    /// An audience element for the given URI
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: Some(uri.into()) }
    }
}

impl ElementPayload for Saml1Audience {
    fn text_content(&self) -> Option<String> {
        self.uri.clone()
    }

    fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
        self.uri = Some(text.to_string());
        Ok(())
    }
}

/// `saml:DoNotCacheCondition`, legal from SAML 1.1 on
#[derive(Debug, Default, Clone, Copy)]
pub struct DoNotCacheCondition;

impl ElementPayload for DoNotCacheCondition {}

/// Authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionType {
    /// `Permit`
    Permit,
    /// `Deny`
    Deny,
    /// `Indeterminate`
    Indeterminate,
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Permit => "Permit",
            Self::Deny => "Deny",
            Self::Indeterminate => "Indeterminate",
        };
        f.write_str(s)
    }
}

impl FromStr for DecisionType {
    type Err = UnmarshallingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(UnmarshallingError::new("Saw an empty value for Decision attribute"));
        }
        match s.to_ascii_uppercase().as_str() {
            "PERMIT" => Ok(Self::Permit),
            "DENY" => Ok(Self::Deny),
            "INDETERMINATE" => Ok(Self::Indeterminate),
            _ => Err(UnmarshallingError::new(format!(
                "Saw an invalid value for Decision attribute: {}",
                s
            ))),
        }
    }
}

/// `saml:AuthorizationDecisionStatement`
#[derive(Debug, Default)]
pub struct AuthorizationDecisionStatement {
    /// `Decision`
    pub decision: Option<DecisionType>,
    /// `Resource`
    pub resource: Option<String>,
    pub(crate) actions: Vec<ObjectId>,
}

impl AuthorizationDecisionStatement {
    /// `saml:Action` children
    pub fn actions(&self) -> &[ObjectId] {
        &self.actions
    }
}

impl ElementPayload for AuthorizationDecisionStatement {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Decision", self.decision);
        push_attr(out, "Resource", self.resource.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        match unqualified(name) {
            Some("Decision") => self.decision = Some(value.parse()?),
            Some("Resource") => self.resource = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.actions.clone()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        if tag != ElementTag::Action {
            return ChildPlacement::Rejected;
        }
        self.actions.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.actions, child)
    }
}

/// `saml:Action`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Action {
    /// `Namespace`
    pub namespace: Option<String>,
    /// Action name
    pub contents: Option<String>,
}

impl ElementPayload for Action {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        push_attr(out, "Namespace", self.namespace.as_ref());
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        if unqualified(name) == Some("Namespace") {
            self.namespace = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn text_content(&self) -> Option<String> {
        self.contents.clone()
    }

    fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_is_case_insensitive() {
        assert_eq!("permit".parse::<DecisionType>().unwrap(), DecisionType::Permit);
        assert_eq!("DENY".parse::<DecisionType>().unwrap(), DecisionType::Deny);
        let err = "maybe".parse::<DecisionType>().unwrap_err();
        assert!(err.message.contains("invalid value for Decision"));
        let err = "".parse::<DecisionType>().unwrap_err();
        assert!(err.message.contains("empty value"));
    }

    #[test]
    fn test_version_attributes() {
        let mut assertion = Saml1Assertion::default();
        assert!(assertion.process_attribute(&QName::local("MajorVersion"), "2").is_err());
        assert!(assertion.process_attribute(&QName::local("MajorVersion"), "one").is_err());
        assertion.process_attribute(&QName::local("MajorVersion"), "1").unwrap();
        assertion.process_attribute(&QName::local("MinorVersion"), "0").unwrap();
        assert_eq!(assertion.version, Some(SamlVersion::V10));
        assert!(assertion.process_attribute(&QName::local("MinorVersion"), "7").is_err());
    }

    #[test]
    fn test_response_shares_version_rules() {
        let mut response = Saml1Response::default();
        assert!(response.process_attribute(&QName::local("MajorVersion"), "2").is_err());
        assert!(response.process_attribute(&QName::local("MinorVersion"), "1").unwrap());
        assert_eq!(response.version, Some(SamlVersion::V11));
        assert!(response.is_id_attribute(&QName::local("ResponseID")));
        response.process_attribute(&QName::local("MinorVersion"), "0").unwrap();
        assert!(!response.is_id_attribute(&QName::local("ResponseID")));
        assert!(!response.process_attribute(&QName::local("Destination"), "x").unwrap());
    }

    #[test]
    fn test_assertion_id_typed_only_from_1_1() {
        let v10 = Saml1Assertion::new("_a", SamlVersion::V10);
        let v11 = Saml1Assertion::new("_a", SamlVersion::V11);
        let name = QName::local("AssertionID");
        assert!(!v10.is_id_attribute(&name));
        assert!(v11.is_id_attribute(&name));
    }
}
