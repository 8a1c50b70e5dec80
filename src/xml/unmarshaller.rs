//! DOM to object tree
//!
//! Unmarshalling always records the source element as the new object's DOM
//! cache, so a freshly unmarshalled tree re-marshalls to the very same DOM
//! nodes. That identity is what keeps enveloped signatures verifiable after
//! a round trip.

use super::registry::ProviderRegistry;
use super::tree::{ObjectId, XmlTree};
use crate::dom::{DomElement, NodeId};
use crate::error::UnmarshallingError;
use crate::names::split_qname;
use crate::namespaces::{ns, Namespace, QName};
use crate::xmlsec::signature::bind_enveloped_references;
use std::fmt;
use tracing::{debug, trace, warn};

/// Builds objects for one binding
pub trait Unmarshaller: Send + Sync + fmt::Debug {
    /// Build an object (and its subtree) from `element`, caching `element`
    /// as the object's DOM
    fn unmarshall(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        element: &DomElement,
    ) -> Result<ObjectId, UnmarshallingError>;
}

/// Unmarshall an element with whichever provider the registry selects
pub fn unmarshall(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    element: &DomElement,
) -> Result<ObjectId, UnmarshallingError> {
    let (name, schema_type) = element_binding(element)?;
    let provider = registry.lookup(&name, schema_type.as_ref()).ok_or_else(|| {
        UnmarshallingError::new(format!("no unmarshaller registered for {}", name))
    })?;
    let unmarshaller = provider.unmarshaller.clone();
    unmarshaller.unmarshall(tree, registry, element)
}

/// Element name and resolved `xsi:type` of a DOM element
pub(crate) fn element_binding(
    element: &DomElement,
) -> Result<(QName, Option<QName>), UnmarshallingError> {
    let doc = element.document().borrow();
    let data = doc
        .element(element.node())
        .ok_or_else(|| UnmarshallingError::new("node is not an element"))?;
    let name = data.name().clone();
    let schema_type = match doc.attribute(element.node(), &QName::namespaced(ns::XSI, "type")) {
        Some(value) => {
            let (prefix, local) = split_qname(value.trim());
            let uri = doc.lookup_namespace_uri(element.node(), prefix);
            if prefix.is_some() && uri.is_none() {
                return Err(UnmarshallingError::new(format!(
                    "unbound prefix in xsi:type value '{}'",
                    value
                )));
            }
            Some(QName::new(uri, local).with_prefix(prefix.map(str::to_string)))
        }
        None => None,
    };
    Ok((name, schema_type))
}

/// Everything the unmarshaller needs from one DOM element, read up front so
/// the document is not borrowed while objects are built
struct ElementSnapshot {
    name: QName,
    schema_type: Option<QName>,
    namespaces: Vec<Namespace>,
    attributes: Vec<(QName, String)>,
    children: Vec<NodeId>,
    text: String,
}

impl ElementSnapshot {
    fn read(element: &DomElement) -> Result<Self, UnmarshallingError> {
        let (name, schema_type) = element_binding(element)?;
        let doc = element.document().borrow();
        let data = doc
            .element(element.node())
            .ok_or_else(|| UnmarshallingError::new("node is not an element"))?;
        Ok(Self {
            name,
            schema_type,
            namespaces: data.namespace_decls.clone(),
            attributes: data
                .attributes
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            children: doc.child_elements(element.node()),
            text: doc.direct_text(element.node()),
        })
    }
}

fn is_schema_instance_attribute(name: &QName) -> bool {
    name.namespace() == Some(ns::XSI)
        && matches!(
            name.local_name.as_str(),
            "type" | "schemaLocation" | "noNamespaceSchemaLocation" | "nil"
        )
}

/// The generic unmarshaller used by every ordinary element binding
#[derive(Debug, Default, Clone, Copy)]
pub struct ElementUnmarshaller;

impl ElementUnmarshaller {
    fn populate(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        id: ObjectId,
        element: &DomElement,
        snapshot: &ElementSnapshot,
    ) -> Result<(), UnmarshallingError> {
        tree.init_unmarshalled(id, snapshot.schema_type.clone(), snapshot.namespaces.clone())?;

        for (name, value) in &snapshot.attributes {
            if is_schema_instance_attribute(name) {
                continue;
            }
            let payload = tree.kind_mut_raw(id)?;
            if payload.process_attribute(name, value)? {
                continue;
            }
            match payload.as_attribute_extensible_mut() {
                Some(extensible) => {
                    extensible.unknown_attributes_mut().insert(name.clone(), value.clone());
                }
                None => trace!(attribute = %name, element = %snapshot.name, "ignoring unknown attribute"),
            }
        }

        // ID-ness is decided once every attribute is known
        let mut id_attributes = Vec::new();
        {
            let payload = tree.kind_mut_raw(id)?;
            for (name, _) in &snapshot.attributes {
                let global = registry.is_id_attribute(name);
                let typed = payload.is_id_attribute(name);
                let mut local = false;
                if let Some(extensible) = payload.as_attribute_extensible_mut() {
                    let map = extensible.unknown_attributes_mut();
                    if map.get(name).is_some() {
                        if global {
                            map.register_id(name.clone());
                        }
                        local = map.is_id(name);
                    }
                }
                if global || typed || local {
                    id_attributes.push(name.clone());
                }
            }
        }
        {
            let mut doc = element.document().borrow_mut();
            for name in &id_attributes {
                doc.set_id_attribute(element.node(), name, true)?;
            }
        }

        for &child_node in &snapshot.children {
            let child_element = DomElement::new(element.document().clone(), child_node);
            let child = unmarshall(tree, registry, &child_element)?;
            if let Err(e) = tree.attach(id, child) {
                if let Err(cleanup) = tree.discard(child) {
                    warn!(error = %cleanup, "failed to discard rejected child");
                }
                return Err(UnmarshallingError::new(format!(
                    "unexpected child element in {}",
                    snapshot.name
                ))
                .with_source(e));
            }
        }

        let text = snapshot.text.trim();
        if !text.is_empty() {
            tree.kind_mut_raw(id)?.process_content(text)?;
        }
        if let Some(signature) = tree.signature_of(id) {
            bind_enveloped_references(tree, signature, id)?;
        }
        Ok(())
    }
}

impl Unmarshaller for ElementUnmarshaller {
    fn unmarshall(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        element: &DomElement,
    ) -> Result<ObjectId, UnmarshallingError> {
        let snapshot = ElementSnapshot::read(element)?;
        debug!(element = %snapshot.name, "unmarshalling DOM element");
        let provider = registry
            .lookup(&snapshot.name, snapshot.schema_type.as_ref())
            .ok_or_else(|| {
                UnmarshallingError::new(format!("no builder registered for {}", snapshot.name))
            })?;
        let kind = provider.builder.build();
        let id = tree.add_named(snapshot.name.clone(), kind);

        match self.populate(tree, registry, id, element, &snapshot) {
            Ok(()) => {
                tree.set_dom(id, element.clone())?;
                Ok(id)
            }
            Err(e) => {
                if let Err(cleanup) = tree.discard(id) {
                    warn!(error = %cleanup, "failed to discard partially unmarshalled object");
                }
                Err(e)
            }
        }
    }
}
