//! Builder / marshaller / unmarshaller registry
//!
//! A [`ProviderRegistry`] maps qualified element names (and, optionally,
//! `xsi:type` names) to a [`Provider`] triple. A missing entry is always a
//! hard failure for the caller; there is no default provider.
//!
//! Lookup policy: the element name is authoritative. A provider registered
//! for an `xsi:type` overrides the element-name provider only when the
//! element actually carries that type.
//!
//! The registry also owns the set of attribute names that are ID-typed
//! wherever they appear. That set belongs to the registry instance; there is
//! no process-wide state.

use super::kind::{builtin_kinds, KindOf, ObjectKind};
use super::marshaller::{ElementMarshaller, Marshaller};
use super::tree::XmlObject;
use super::unmarshaller::{ElementUnmarshaller, Unmarshaller};
use crate::namespaces::{ns, QName};
use crate::xml::any::XsAny;
use crate::xmlsec::signature::{Signature, SignatureMarshaller, SignatureUnmarshaller};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Creates empty payloads for one binding
pub trait XmlObjectBuilder: Send + Sync + fmt::Debug {
    /// A fresh, empty payload
    fn build(&self) -> ObjectKind;
}

/// Builder backed by a constructor function
#[derive(Debug, Clone, Copy)]
pub struct KindBuilder {
    make: fn() -> ObjectKind,
}

fn make_default<T: KindOf>() -> ObjectKind {
    T::default().into_kind()
}

impl KindBuilder {
    /// Wrap a constructor
    pub fn new(make: fn() -> ObjectKind) -> Self {
        Self { make }
    }

    /// Builder producing `T::default()`
    pub fn of<T: KindOf>() -> Self {
        Self::new(make_default::<T>)
    }
}

impl XmlObjectBuilder for KindBuilder {
    fn build(&self) -> ObjectKind {
        (self.make)()
    }
}

/// The builder / marshaller / unmarshaller triple for one binding
#[derive(Debug, Clone)]
pub struct Provider {
    /// Payload builder
    pub builder: Arc<dyn XmlObjectBuilder>,
    /// Object to DOM
    pub marshaller: Arc<dyn Marshaller>,
    /// DOM to object
    pub unmarshaller: Arc<dyn Unmarshaller>,
}

impl Provider {
    /// Generic element provider around a constructor
    pub fn standard(make: fn() -> ObjectKind) -> Self {
        Self {
            builder: Arc::new(KindBuilder::new(make)),
            marshaller: Arc::new(ElementMarshaller),
            unmarshaller: Arc::new(ElementUnmarshaller),
        }
    }

    /// Generic element provider for a payload type
    pub fn of<T: KindOf>() -> Self {
        Self::standard(make_default::<T>)
    }
}

/// Registry of providers keyed by qualified name
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    by_element: HashMap<QName, Provider>,
    by_type: HashMap<QName, Provider>,
    id_attributes: HashSet<QName>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in binding
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (name, make) in builtin_kinds() {
            registry.register(name, Provider::standard(make));
        }
        registry.register(
            Signature::default_element_name(),
            Provider {
                builder: Arc::new(KindBuilder::of::<Signature>()),
                marshaller: Arc::new(SignatureMarshaller),
                unmarshaller: Arc::new(SignatureUnmarshaller),
            },
        );
        // extension conditions are kept as generic content
        for namespace in [ns::SAML2, ns::SAML1] {
            registry.register(
                QName::prefixed(namespace, "Condition", ns::SAML_PREFIX),
                Provider::of::<XsAny>(),
            );
        }
        for local in ["anyType", "string"] {
            registry.register_type(QName::namespaced(ns::XSD, local), Provider::of::<XsAny>());
        }
        registry
    }

    /// Register (or replace) the provider for an element name
    pub fn register(&mut self, element_name: QName, provider: Provider) -> Option<Provider> {
        self.by_element.insert(element_name, provider)
    }

    /// Register (or replace) the provider for an `xsi:type` name
    pub fn register_type(&mut self, type_name: QName, provider: Provider) -> Option<Provider> {
        self.by_type.insert(type_name, provider)
    }

    /// Remove the provider for an element name
    pub fn deregister(&mut self, element_name: &QName) -> Option<Provider> {
        self.by_element.remove(element_name)
    }

    /// Resolve the provider for an element with an optional `xsi:type`
    pub fn lookup(&self, element_name: &QName, schema_type: Option<&QName>) -> Option<&Provider> {
        schema_type
            .and_then(|t| self.by_type.get(t))
            .or_else(|| self.by_element.get(element_name))
    }

    /// Resolve the provider for an existing object
    pub fn provider_for(&self, object: &XmlObject) -> Option<&Provider> {
        self.lookup(object.element_name(), object.schema_type())
    }

    /// Builder for an element name
    pub fn builder(&self, element_name: &QName) -> Option<&Arc<dyn XmlObjectBuilder>> {
        self.by_element.get(element_name).map(|p| &p.builder)
    }

    /// Treat an attribute name as ID-typed on every element
    pub fn register_id_attribute(&mut self, name: QName) {
        self.id_attributes.insert(name);
    }

    /// Stop treating an attribute name as ID-typed
    pub fn deregister_id_attribute(&mut self, name: &QName) -> bool {
        self.id_attributes.remove(name)
    }

    /// Whether an attribute name is registered as ID-typed
    pub fn is_id_attribute(&self, name: &QName) -> bool {
        self.id_attributes.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::kind::ElementTag;

    #[test]
    fn test_defaults_cover_both_saml_versions() {
        let registry = ProviderRegistry::with_defaults();
        let saml2 = QName::namespaced(ns::SAML2, "Assertion");
        let saml1 = QName::namespaced(ns::SAML1, "Assertion");

        let built = registry.builder(&saml2).unwrap().build();
        assert_eq!(built.tag(), ElementTag::Assertion);
        let built = registry.builder(&saml1).unwrap().build();
        assert_eq!(built.tag(), ElementTag::Saml1Assertion);
        assert!(registry.lookup(&QName::namespaced("urn:nope", "Thing"), None).is_none());
    }

    #[test]
    fn test_type_overrides_only_when_registered() {
        let registry = ProviderRegistry::with_defaults();
        let element = QName::namespaced(ns::SAML2, "Issuer");
        let string_type = QName::namespaced(ns::XSD, "string");
        let unknown_type = QName::namespaced("urn:types", "Custom");

        let by_type = registry.lookup(&element, Some(&string_type)).unwrap();
        assert_eq!(by_type.builder.build().tag(), ElementTag::Any);
        let fallback = registry.lookup(&element, Some(&unknown_type)).unwrap();
        assert_eq!(fallback.builder.build().tag(), ElementTag::Issuer);
    }

    #[test]
    fn test_id_attributes_are_per_instance() {
        let mut first = ProviderRegistry::new();
        let second = ProviderRegistry::new();
        let name = QName::namespaced("urn:x", "RefId");
        first.register_id_attribute(name.clone());
        assert!(first.is_id_attribute(&name));
        assert!(!second.is_id_attribute(&name));
        assert!(first.deregister_id_attribute(&name));
    }
}
