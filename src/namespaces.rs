//! XML namespace handling
//!
//! Qualified names, namespace declarations, prefix-resolution scopes and the
//! well-known namespace URIs of the SAML, XML-DSig and WS-Security vocabularies.

use crate::error::{Error, Result};
use crate::names;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Well-known namespace URIs and their conventional prefixes
pub mod ns {
    /// XML namespace (bound to `xml` by definition)
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    /// XMLNS namespace
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
    /// XML Schema instance namespace
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    /// XML Schema instance prefix
    pub const XSI_PREFIX: &str = "xsi";
    /// XML Schema namespace
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";

    /// SAML 1.x assertion namespace
    pub const SAML1: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
    /// SAML 1.x protocol namespace
    pub const SAML1P: &str = "urn:oasis:names:tc:SAML:1.0:protocol";
    /// SAML 2.0 assertion namespace
    pub const SAML2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    /// SAML 2.0 protocol namespace
    pub const SAML2P: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
    /// Assertion prefix (both SAML versions)
    pub const SAML_PREFIX: &str = "saml";
    /// Protocol prefix (both SAML versions)
    pub const SAMLP_PREFIX: &str = "samlp";

    /// XML-DSig namespace
    pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
    /// XML-DSig prefix
    pub const DSIG_PREFIX: &str = "ds";
    /// Exclusive C14N namespace (InclusiveNamespaces)
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// Exclusive C14N prefix
    pub const EXC_C14N_PREFIX: &str = "ec";

    /// WS-Security utility namespace
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    /// WS-Security utility prefix
    pub const WSU_PREFIX: &str = "wsu";
}

/// Qualified name: namespace URI, local name and a cosmetic prefix.
///
/// The prefix is kept only so documents round-trip with their original
/// spelling; equality and hashing consider the namespace and local name
/// alone, so registry dispatch never depends on prefix choice.
#[derive(Debug, Clone)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<String>,
    /// Local name
    pub local_name: String,
    /// Preferred prefix (None for the default namespace / no prefix)
    pub prefix: Option<String>,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        let namespace: Option<String> = namespace.map(Into::into);
        Self {
            namespace: namespace.filter(|s| !s.is_empty()),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Create a QName with a namespace and prefix
    pub fn prefixed(
        namespace: impl Into<String>,
        local_name: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self::namespaced(namespace, local_name).with_prefix(Some(prefix.into()))
    }

    /// Replace the cosmetic prefix
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    /// Parse Clark notation (`{namespace}local` or `local`)
    pub fn from_clark(clark: &str) -> Result<Self> {
        let qname = match clark.strip_prefix('{') {
            Some(rest) => {
                let (ns, local) = rest
                    .split_once('}')
                    .ok_or_else(|| Error::Name(format!("Unterminated namespace in '{}'", clark)))?;
                QName::new(Some(ns), local)
            }
            None => QName::local(clark),
        };
        names::validate_ncname(&qname.local_name)?;
        Ok(qname)
    }

    /// Namespace URI as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Prefixed lexical form (`prefix:local` or `local`)
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Whether this name matches the given namespace and local name
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref().unwrap_or("") == namespace
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Namespace URI; empty undeclares the default namespace
    pub uri: String,
    /// Prefix (None for the default namespace)
    pub prefix: Option<String>,
}

impl Namespace {
    /// Create a namespace declaration
    pub fn new(uri: impl Into<String>, prefix: Option<impl Into<String>>) -> Self {
        let prefix: Option<String> = prefix.map(Into::into);
        Self {
            uri: uri.into(),
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Declaration attribute name (`xmlns` or `xmlns:prefix`)
    pub fn attribute_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("xmlns:{}", p),
            None => "xmlns".to_string(),
        }
    }
}

/// Namespace context for resolving prefixes within one element scope
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: HashMap<String, String>,
    /// Default namespace (no prefix); Some("") records an undeclaration
    default_namespace: Option<String>,
}

impl NamespaceContext {
    /// Create a new empty namespace context
    pub fn new() -> Self {
        Self {
            prefixes: HashMap::new(),
            default_namespace: None,
        }
    }

    /// Record a declaration in this scope
    pub fn declare(&mut self, namespace: &Namespace) {
        match &namespace.prefix {
            Some(p) => {
                self.prefixes.insert(p.clone(), namespace.uri.clone());
            }
            None => self.default_namespace = Some(namespace.uri.clone()),
        }
    }

    /// Look up a prefix declared in this scope only.
    ///
    /// `Some("")` means the default namespace was undeclared here.
    pub fn get(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some(p) => self.prefixes.get(p).map(|s| s.as_str()),
            None => self.default_namespace.as_deref(),
        }
    }

    /// Number of declarations in this scope
    pub fn len(&self) -> usize {
        self.prefixes.len() + usize::from(self.default_namespace.is_some())
    }

    /// Whether this scope declares nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a prefix against a stack of scopes, innermost last.
///
/// Returns `Ok(None)` for an unprefixed name outside any default namespace.
pub fn resolve_prefix(scopes: &[NamespaceContext], prefix: Option<&str>) -> Result<Option<String>> {
    if prefix == Some("xml") {
        return Ok(Some(ns::XML.to_string()));
    }
    for scope in scopes.iter().rev() {
        if let Some(uri) = scope.get(prefix) {
            return Ok(if uri.is_empty() { None } else { Some(uri.to_string()) });
        }
    }
    match prefix {
        Some(p) => Err(Error::Namespace(format!("Unbound prefix: {}", p))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qname_equality_ignores_prefix() {
        let a = QName::prefixed(ns::SAML2, "Assertion", "saml");
        let b = QName::prefixed(ns::SAML2, "Assertion", "saml2");
        let c = QName::namespaced(ns::SAML2, "Assertion");
        assert_eq!(a, b);
        assert_eq!(a, c);

        let set: HashSet<QName> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_qname_display_and_qualified() {
        let qname = QName::prefixed(ns::DSIG, "Signature", "ds");
        assert_eq!(qname.to_string(), "{http://www.w3.org/2000/09/xmldsig#}Signature");
        assert_eq!(qname.qualified(), "ds:Signature");
        assert_eq!(QName::local("ID").to_string(), "ID");
    }

    #[test]
    fn test_from_clark() {
        let q = QName::from_clark("{urn:x}Id").unwrap();
        assert_eq!(q.namespace(), Some("urn:x"));
        assert_eq!(q.local_name, "Id");
        assert!(QName::from_clark("{urn:x Id").is_err());
        assert!(QName::from_clark("{urn:x}1bad").is_err());
    }

    #[test]
    fn test_resolve_prefix_scopes() {
        let mut outer = NamespaceContext::new();
        outer.declare(&Namespace::new(ns::SAML2, Some("saml")));
        outer.declare(&Namespace::new("urn:default", None::<String>));
        let mut inner = NamespaceContext::new();
        inner.declare(&Namespace::new("", None::<String>));

        let scopes = vec![outer, inner];
        assert_eq!(
            resolve_prefix(&scopes, Some("saml")).unwrap().as_deref(),
            Some(ns::SAML2)
        );
        assert_eq!(resolve_prefix(&scopes, None).unwrap(), None);
        assert!(resolve_prefix(&scopes, Some("nope")).is_err());
        assert_eq!(
            resolve_prefix(&[], Some("xml")).unwrap().as_deref(),
            Some(ns::XML)
        );
    }
}
