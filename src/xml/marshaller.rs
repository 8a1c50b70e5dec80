//! Object tree to DOM
//!
//! Entry points ([`marshall`], [`marshall_into_document`],
//! [`marshall_into_parent`]) handle the DOM cache: an object whose cache is
//! valid is reused as-is (moved or imported into the target document), and
//! only objects without a cache are handed to their registered
//! [`Marshaller`] to build fresh DOM.

use super::kind::MarshalledAttribute;
use super::registry::ProviderRegistry;
use super::tree::{ObjectId, XmlTree};
use crate::dom::{new_document, Document, DocumentRef, DomElement, NodeId};
use crate::error::{Error, MarshallingError, Result};
use crate::namespaces::{ns, Namespace, QName};
use std::fmt;
use tracing::{debug, trace};

/// Builds DOM for one binding.
///
/// Implementations hold no per-call state and are shared between threads.
pub trait Marshaller: Send + Sync + fmt::Debug {
    /// Create a new element for `id` in `doc`, append it to `parent` when
    /// given, marshall the children and cache the element on the object.
    fn build_dom(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        id: ObjectId,
        doc: &DocumentRef,
        parent: Option<NodeId>,
    ) -> std::result::Result<NodeId, MarshallingError>;
}

/// Marshall an object, returning its cached element when still valid.
///
/// Without a cache the object is marshalled as the root of a new document.
pub fn marshall(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
) -> std::result::Result<DomElement, MarshallingError> {
    if let Some(cached) = tree.dom(id) {
        trace!(object = %id, "returning cached DOM");
        return Ok(cached);
    }
    marshall_into_document(tree, registry, id, &new_document())
}

/// Marshall an object as the document element of `doc`.
///
/// An existing document element is replaced, not appended to.
pub fn marshall_into_document(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
    doc: &DocumentRef,
) -> std::result::Result<DomElement, MarshallingError> {
    let node = match tree.dom(id) {
        Some(cached) => adopt(tree, id, &cached, doc)?,
        None => build(tree, registry, id, doc, None)?,
    };
    doc.borrow_mut().set_document_element(node)?;
    tree.release_parent_dom(id)?;
    Ok(DomElement::new(doc.clone(), node))
}

/// Marshall an object as the last child of an existing element.
///
/// A cached fragment is moved (or imported) under `parent` and keeps its
/// cache; the cache of the object's former ancestors is dropped since their
/// DOM no longer contains the fragment.
pub fn marshall_into_parent(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
    parent: &DomElement,
) -> std::result::Result<DomElement, MarshallingError> {
    let doc = parent.document().clone();
    let node = match tree.dom(id) {
        Some(cached) => {
            let node = adopt(tree, id, &cached, &doc)?;
            doc.borrow_mut().append_child(parent.node(), node)?;
            node
        }
        None => build(tree, registry, id, &doc, Some(parent.node()))?,
    };
    tree.release_parent_dom(id)?;
    Ok(DomElement::new(doc, node))
}

/// Marshall a child while its parent element is being built
pub(crate) fn marshall_child(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    child: ObjectId,
    doc: &DocumentRef,
    parent: NodeId,
) -> std::result::Result<NodeId, MarshallingError> {
    match tree.dom(child) {
        Some(cached) => {
            let node = adopt(tree, child, &cached, doc)?;
            doc.borrow_mut().append_child(parent, node)?;
            Ok(node)
        }
        None => build(tree, registry, child, doc, Some(parent)),
    }
}

fn build(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
    doc: &DocumentRef,
    parent: Option<NodeId>,
) -> std::result::Result<NodeId, MarshallingError> {
    let object = tree.get(id)?;
    let marshaller = registry
        .provider_for(object)
        .map(|p| p.marshaller.clone())
        .ok_or_else(|| {
            MarshallingError::new(format!(
                "no marshaller registered for {}",
                object.element_name()
            ))
        })?;
    marshaller.build_dom(tree, registry, id, doc, parent)
}

/// Bring a cached subtree into `doc`, remapping the caches of every object
/// in it when the subtree has to be imported from another document
fn adopt(
    tree: &mut XmlTree,
    id: ObjectId,
    cached: &DomElement,
    doc: &DocumentRef,
) -> std::result::Result<NodeId, MarshallingError> {
    if cached.same_document(doc) {
        return Ok(cached.node());
    }
    let (node, mapping) = {
        let source = cached.document().borrow();
        doc.borrow_mut().import_node(&source, cached.node())?
    };
    for object in tree.descendants(id) {
        let Some(dom) = tree.dom(object) else {
            continue;
        };
        if !dom.same_document(cached.document()) {
            continue;
        }
        if let Some(&copy) = mapping.get(&dom.node()) {
            tree.set_dom(object, DomElement::new(doc.clone(), copy))?;
        }
    }
    trace!(object = %id, "imported cached DOM into target document");
    Ok(node)
}

/// Declare `namespace` on `node` unless it is already in scope
pub(crate) fn declare_if_needed(doc: &mut Document, node: NodeId, namespace: &Namespace) -> Result<()> {
    let in_scope = doc.lookup_namespace_uri(node, namespace.prefix.as_deref());
    if in_scope.as_deref().unwrap_or("") == namespace.uri {
        return Ok(());
    }
    let clash = doc
        .element(node)
        .and_then(|e| e.namespace_decls.iter().find(|d| d.prefix == namespace.prefix))
        .map(|d| d.uri.clone());
    if let Some(bound) = clash {
        return Err(Error::Namespace(format!(
            "prefix '{}' is already bound to '{}' on this element, cannot bind it to '{}'",
            namespace.prefix.as_deref().unwrap_or(""),
            bound,
            namespace.uri
        )));
    }
    doc.declare_namespace(node, namespace.clone())
}

/// Find or declare a prefix for `uri` usable on attributes of `node`
pub(crate) fn ensure_prefix(
    doc: &mut Document,
    node: NodeId,
    uri: &str,
    preferred: Option<&str>,
) -> Result<String> {
    if let Some(prefix) = preferred {
        match doc.lookup_namespace_uri(node, Some(prefix)) {
            Some(bound) if bound == uri => return Ok(prefix.to_string()),
            _ => {
                let declared_here = doc
                    .element(node)
                    .map(|e| e.namespace_decls.iter().any(|d| d.prefix.as_deref() == Some(prefix)))
                    .unwrap_or(false);
                if !declared_here {
                    doc.declare_namespace(node, Namespace::new(uri, Some(prefix)))?;
                    return Ok(prefix.to_string());
                }
            }
        }
    }
    if let Some(Some(prefix)) = doc.lookup_prefix(node, uri) {
        return Ok(prefix);
    }
    let mut counter = 1;
    loop {
        let candidate = format!("ns{}", counter);
        if doc.lookup_namespace_uri(node, Some(&candidate)).is_none() {
            doc.declare_namespace(node, Namespace::new(uri, Some(candidate.as_str())))?;
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// The generic marshaller used by every ordinary element binding
#[derive(Debug, Default, Clone, Copy)]
pub struct ElementMarshaller;

impl Marshaller for ElementMarshaller {
    fn build_dom(
        &self,
        tree: &mut XmlTree,
        registry: &ProviderRegistry,
        id: ObjectId,
        doc: &DocumentRef,
        parent: Option<NodeId>,
    ) -> std::result::Result<NodeId, MarshallingError> {
        let object = tree.get(id)?;
        let name = object.element_name().clone();
        debug!(element = %name, "marshalling XML object");

        let schema_type = object.schema_type().cloned();
        let namespaces: Vec<Namespace> = object.namespaces().iter().cloned().collect();
        let payload = object.payload();
        let mut attributes = Vec::new();
        payload.marshall_attributes(&mut attributes);
        if let Some(extensible) = payload.as_attribute_extensible() {
            let map = extensible.unknown_attributes();
            for (attr_name, value) in map.iter() {
                attributes.push(
                    MarshalledAttribute::named(attr_name.clone(), value).id(map.is_id(attr_name)),
                );
            }
        }
        let text = payload.text_content();
        let children = payload.ordered_children();

        let node = {
            let mut d = doc.borrow_mut();
            let node = d.create_element(name.clone());
            if let Some(parent) = parent {
                d.append_child(parent, node)?;
            }

            match name.namespace() {
                Some(uri) => declare_if_needed(&mut d, node, &Namespace::new(uri, name.prefix.clone()))?,
                None => {
                    if d.lookup_namespace_uri(node, None).is_some() {
                        d.declare_namespace(node, Namespace::new("", None::<String>))?;
                    }
                }
            }
            for namespace in &namespaces {
                declare_if_needed(&mut d, node, namespace)?;
            }

            if let Some(type_name) = &schema_type {
                let xsi = ensure_prefix(&mut d, node, ns::XSI, Some(ns::XSI_PREFIX))?;
                let value = match type_name.namespace() {
                    Some(uri) => {
                        let prefix = ensure_prefix(&mut d, node, uri, type_name.prefix.as_deref())?;
                        format!("{}:{}", prefix, type_name.local_name)
                    }
                    None => type_name.local_name.clone(),
                };
                d.set_attribute(node, QName::prefixed(ns::XSI, "type", xsi), value)?;
            }

            for attr in attributes {
                let attr_name = match attr.name.namespace() {
                    Some(uri) => {
                        let prefix = ensure_prefix(&mut d, node, uri, attr.name.prefix.as_deref())?;
                        attr.name.clone().with_prefix(Some(prefix))
                    }
                    None => attr.name.clone(),
                };
                let is_id = attr.is_id || registry.is_id_attribute(&attr.name);
                d.set_attribute(node, attr_name.clone(), attr.value)?;
                if is_id {
                    d.set_id_attribute(node, &attr_name, true)?;
                }
            }

            if let Some(text) = text {
                let text_node = d.create_text(text);
                d.append_child(node, text_node)?;
            }
            node
        };

        for child in children {
            marshall_child(tree, registry, child, doc, node)?;
        }
        tree.set_dom(id, DomElement::new(doc.clone(), node))?;
        Ok(node)
    }
}
