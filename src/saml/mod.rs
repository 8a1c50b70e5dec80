//! SAML and WS-Security element bindings
//!
//! Each binding is a payload struct plugged into [`crate::xml::ObjectKind`].
//! Attribute fields are public; child slots are private and change only
//! through [`crate::xml::XmlTree::attach`] and friends so the DOM cache stays
//! honest.

pub mod saml1;
pub mod saml2;
pub mod wssecurity;

use crate::error::UnmarshallingError;
use crate::namespaces::QName;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

/// SAML specification version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SamlVersion {
    /// SAML 1.0
    V10,
    /// SAML 1.1
    V11,
    /// SAML 2.0
    V20,
}

impl SamlVersion {
    /// Version from its major and minor numbers
    pub fn from_parts(major: u32, minor: u32) -> Option<Self> {
        match (major, minor) {
            (1, 0) => Some(Self::V10),
            (1, 1) => Some(Self::V11),
            (2, 0) => Some(Self::V20),
            _ => None,
        }
    }

    /// Major version number
    pub fn major(self) -> u32 {
        match self {
            Self::V10 | Self::V11 => 1,
            Self::V20 => 2,
        }
    }

    /// Minor version number
    pub fn minor(self) -> u32 {
        match self {
            Self::V11 => 1,
            Self::V10 | Self::V20 => 0,
        }
    }
}

impl fmt::Display for SamlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl FromStr for SamlVersion {
    type Err = UnmarshallingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UnmarshallingError::new(format!("invalid SAML version '{}'", s));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Self::from_parts(major, minor).ok_or_else(invalid)
    }
}

/// Parse an `xs:dateTime` instant; values without a zone are taken as UTC
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, UnmarshallingError> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            UnmarshallingError::new(format!("invalid xs:dateTime value '{}'", value)).with_source(e)
        })
}

/// Lexical form used when marshalling instants
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Local name of an attribute in no namespace
pub(crate) fn unqualified(name: &QName) -> Option<&str> {
    match name.namespace() {
        None => Some(name.local_name.as_str()),
        Some(_) => None,
    }
}

/// [`parse_instant`] with the attribute name in the error
pub(crate) fn instant_attribute(
    attribute: &str,
    value: &str,
) -> Result<Option<DateTime<Utc>>, UnmarshallingError> {
    parse_instant(value).map(Some).map_err(|e| {
        UnmarshallingError::new(format!("invalid {} attribute", attribute)).with_source(e)
    })
}
