//! Convenience operations over the marshalling engine
//!
//! Byte-level round trips, object cloning and namespace lookups that walk
//! the object tree rather than the DOM.

use super::marshaller::marshall;
use super::registry::ProviderRegistry;
use super::tree::{ObjectId, XmlTree};
use super::unmarshaller::unmarshall;
use crate::dom::parser::ParserPool;
use crate::dom::serialize::{document_to_writer, node_to_string};
use crate::dom::{new_document, DomElement};
use crate::error::{MarshallingError, UnmarshallingError};
use std::io::{Read, Write};

/// Marshall an object and write its owning document to `out`
pub fn marshall_to_writer<W: Write>(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
    out: W,
) -> Result<(), MarshallingError> {
    let element = marshall(tree, registry, id)?;
    let doc = element.document().borrow();
    document_to_writer(&doc, out)?;
    Ok(())
}

/// Marshall an object and serialize just its element
pub fn marshall_to_string(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
) -> Result<String, MarshallingError> {
    let element = marshall(tree, registry, id)?;
    let doc = element.document().borrow();
    Ok(node_to_string(&doc, element.node())?)
}

/// Unmarshall a DOM element (alias of [`unmarshall`] kept next to its
/// byte-level siblings)
pub fn unmarshall_element(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    element: &DomElement,
) -> Result<ObjectId, UnmarshallingError> {
    unmarshall(tree, registry, element)
}

/// Parse bytes with a pooled parser and unmarshall the document element
pub fn unmarshall_from_bytes(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    pool: &ParserPool,
    input: &[u8],
) -> Result<ObjectId, UnmarshallingError> {
    let doc = pool
        .parse(input)
        .map_err(|e| UnmarshallingError::new("unable to parse XML input").with_source(e))?;
    unmarshall_document(tree, registry, doc)
}

/// Parse a stream with a pooled parser and unmarshall the document element
pub fn unmarshall_from_reader<R: Read>(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    pool: &ParserPool,
    reader: R,
) -> Result<ObjectId, UnmarshallingError> {
    let doc = pool
        .parse_reader(reader)
        .map_err(|e| UnmarshallingError::new("unable to parse XML input").with_source(e))?;
    unmarshall_document(tree, registry, doc)
}

fn unmarshall_document(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    doc: crate::dom::DocumentRef,
) -> Result<ObjectId, UnmarshallingError> {
    let root = doc
        .borrow()
        .document_element()
        .ok_or_else(|| UnmarshallingError::new("document has no root element"))?;
    unmarshall(tree, registry, &DomElement::new(doc, root))
}

/// What [`clone_object`] does with the DOM of the copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneOutputOption {
    /// The copy carries no DOM cache
    #[default]
    DropDom,
    /// The copy's DOM is the document element of a fresh document
    RootDomInNewDocument,
    /// The copy's DOM is a detached clone in the source object's document
    UnrootedDom,
}

/// Deep-copy an object by marshalling it and unmarshalling a copy of the
/// resulting DOM. The source keeps its own cache; the copy is detached.
pub fn clone_object(
    tree: &mut XmlTree,
    registry: &ProviderRegistry,
    id: ObjectId,
    option: CloneOutputOption,
) -> Result<ObjectId, UnmarshallingError> {
    let source = marshall(tree, registry, id)
        .map_err(|e| UnmarshallingError::new("unable to marshall object for cloning").with_source(e))?;

    let copy_element = if option == CloneOutputOption::RootDomInNewDocument {
        let target = new_document();
        let copy_node = {
            let from = source.document().borrow();
            let (node, _) = target.borrow_mut().import_node(&from, source.node())?;
            node
        };
        target.borrow_mut().set_document_element(copy_node)?;
        DomElement::new(target, copy_node)
    } else {
        let copy_node = source.document().borrow_mut().deep_clone(source.node())?;
        DomElement::new(source.document().clone(), copy_node)
    };

    let copy = unmarshall(tree, registry, &copy_element)?;
    if option == CloneOutputOption::DropDom {
        tree.release_dom(copy)?;
        tree.release_children_dom(copy)?;
    }
    Ok(copy)
}

/// Resolve a prefix against the namespaces declared on an object and its
/// ancestors (nearest first)
pub fn lookup_namespace_uri(tree: &XmlTree, id: ObjectId, prefix: Option<&str>) -> Option<String> {
    std::iter::once(id)
        .chain(tree.ancestors(id))
        .filter_map(|o| tree.get(o).ok())
        .find_map(|o| {
            o.namespaces()
                .iter()
                .find(|n| n.prefix.as_deref() == prefix)
                .map(|n| n.uri.clone())
        })
}

/// Find a prefix bound to `uri` on an object or its ancestors; the inner
/// `None` is the default namespace
pub fn lookup_namespace_prefix(tree: &XmlTree, id: ObjectId, uri: &str) -> Option<Option<String>> {
    std::iter::once(id)
        .chain(tree.ancestors(id))
        .filter_map(|o| tree.get(o).ok())
        .find_map(|o| {
            o.namespaces()
                .iter()
                .find(|n| n.uri == uri)
                .map(|n| n.prefix.clone())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::ns;
    use crate::saml::saml2::{Assertion, Issuer};

    #[test]
    fn test_string_round_trip() {
        let registry = ProviderRegistry::with_defaults();
        let pool = ParserPool::new();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("a1"));
        let issuer = tree.add(Issuer::new("idp"));
        tree.attach(assertion, issuer).unwrap();

        let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
        let copy = unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).unwrap();
        assert_eq!(tree.xml_id(copy), Some("a1"));
        let copied_issuer = tree.payload::<Assertion>(copy).unwrap().issuer().unwrap();
        assert_eq!(tree.payload::<Issuer>(copied_issuer).unwrap().value.as_deref(), Some("idp"));
    }

    #[test]
    fn test_unmarshall_from_bytes_wraps_parse_errors() {
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let err = unmarshall_from_bytes(&mut tree, &registry, &ParserPool::new(), b"<a><b></a>")
            .unwrap_err();
        assert!(err.has_source());
    }

    #[test]
    fn test_clone_object_options() {
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("a1"));

        let dropped = clone_object(&mut tree, &registry, assertion, CloneOutputOption::DropDom).unwrap();
        assert!(tree.dom(dropped).is_none());
        assert!(tree.dom(assertion).is_some());

        let rooted =
            clone_object(&mut tree, &registry, assertion, CloneOutputOption::RootDomInNewDocument).unwrap();
        assert!(tree.dom(rooted).unwrap().is_document_element());

        let unrooted = clone_object(&mut tree, &registry, assertion, CloneOutputOption::UnrootedDom).unwrap();
        let dom = tree.dom(unrooted).unwrap();
        let original = tree.dom(assertion).unwrap();
        assert!(!dom.is_document_element());
        assert!(!dom.is_same_node(&original));
        assert!(dom.same_document(original.document()));
        assert!(dom.parent_element().is_none());
        assert_eq!(tree.xml_id(unrooted), Some("a1"));
    }

    #[test]
    fn test_namespace_lookup_walks_parents() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("a1"));
        let issuer = tree.add(Issuer::new("idp"));
        tree.attach(assertion, issuer).unwrap();
        tree.add_namespace(assertion, crate::namespaces::Namespace::new("urn:extra", Some("ex")))
            .unwrap();

        assert_eq!(lookup_namespace_uri(&tree, issuer, Some("ex")).as_deref(), Some("urn:extra"));
        assert_eq!(
            lookup_namespace_prefix(&tree, issuer, ns::SAML2),
            Some(Some("saml".to_string()))
        );
        assert_eq!(lookup_namespace_uri(&tree, issuer, Some("zz")), None);
    }
}
