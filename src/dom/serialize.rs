//! DOM serialization with quick-xml

use super::{Attr, Document, NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::namespaces::Namespace;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

fn write_failed(err: quick_xml::Error) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}

/// Serialize a node and its subtree.
///
/// When `node` is an element, bindings it inherits from ancestors are
/// redeclared on it so the output is namespace-well-formed on its own.
pub fn write_node<W: Write>(doc: &Document, node: NodeId, writer: &mut Writer<W>) -> Result<()> {
    let inherited: Vec<Namespace> = match doc.parent_element(node) {
        Some(parent) => {
            let own: Vec<Option<String>> = doc
                .element(node)
                .map(|e| e.namespace_decls.iter().map(|d| d.prefix.clone()).collect())
                .unwrap_or_default();
            doc.in_scope_namespaces(parent)
                .into_iter()
                .filter(|d| !own.contains(&d.prefix))
                .filter(|d| !(d.prefix.is_none() && d.uri.is_empty()))
                .collect()
        }
        None => Vec::new(),
    };
    write_rec(doc, node, writer, &inherited)
}

fn attribute_lexical_name(doc: &Document, node: NodeId, attr: &Attr) -> String {
    match (&attr.name.prefix, attr.name.namespace()) {
        (Some(_), _) => attr.name.qualified(),
        (None, Some(uri)) => match doc.lookup_prefix(node, uri) {
            Some(Some(prefix)) => format!("{}:{}", prefix, attr.name.local_name),
            _ => attr.name.local_name.clone(),
        },
        (None, None) => attr.name.local_name.clone(),
    }
}

fn write_rec<W: Write>(
    doc: &Document,
    node: NodeId,
    writer: &mut Writer<W>,
    extra_decls: &[Namespace],
) -> Result<()> {
    match doc.kind(node) {
        Some(NodeKind::Document) => {
            for &child in doc.children(node) {
                write_rec(doc, child, writer, &[])?;
            }
        }
        Some(NodeKind::Element(element)) => {
            let name = element.name().qualified();
            let mut start = BytesStart::new(name.as_str());
            for decl in element.namespace_decls.iter().chain(extra_decls.iter()) {
                start.push_attribute((decl.attribute_name().as_str(), decl.uri.as_str()));
            }
            for attr in &element.attributes {
                let lexical = attribute_lexical_name(doc, node, attr);
                start.push_attribute((lexical.as_str(), attr.value.as_str()));
            }

            let children = doc.children(node);
            if children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(write_failed)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(write_failed)?;
                for &child in children {
                    write_rec(doc, child, writer, &[])?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(name.as_str())))
                    .map_err(write_failed)?;
            }
        }
        Some(NodeKind::Text(text)) => {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_failed)?;
        }
        Some(NodeKind::Comment(text)) => {
            writer
                .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                .map_err(write_failed)?;
        }
        None => {
            return Err(Error::Structure(format!(
                "no DOM node with index {}",
                node.index()
            )))
        }
    }
    Ok(())
}

/// Serialize an element subtree to a string (no XML declaration)
pub fn node_to_string(doc: &Document, node: NodeId) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(doc, node, &mut writer)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::Structure(format!("serializer produced invalid UTF-8: {}", e)))
}

/// Serialize a whole document, with an XML declaration
pub fn document_to_writer<W: Write>(doc: &Document, out: W) -> Result<()> {
    let mut writer = Writer::new(out);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_failed)?;
    write_rec(doc, doc.root(), &mut writer, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::ParserPool;
    use crate::namespaces::{ns, QName};

    #[test]
    fn test_serialize_escapes_and_roundtrips() {
        let mut doc = Document::new();
        let root = doc.create_element(QName::prefixed(ns::SAML2, "Audience", "saml"));
        doc.declare_namespace(root, Namespace::new(ns::SAML2, Some("saml"))).unwrap();
        doc.set_attribute(root, QName::local("note"), "a\"b<c").unwrap();
        let text = doc.create_text("x & y");
        doc.append_child(root, text).unwrap();
        doc.set_document_element(root).unwrap();

        let xml = node_to_string(&doc, root).unwrap();
        assert!(xml.starts_with("<saml:Audience xmlns:saml="));
        assert!(xml.contains("x &amp; y"));

        let reparsed = ParserPool::new().parse(xml.as_bytes()).unwrap();
        let reparsed = reparsed.borrow();
        let root = reparsed.document_element().unwrap();
        assert_eq!(reparsed.attribute(root, &QName::local("note")), Some("a\"b<c"));
        assert_eq!(reparsed.text_content(root), "x & y");
    }

    #[test]
    fn test_fragment_carries_inherited_namespaces() {
        let xml = br#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"><saml:Issuer>idp</saml:Issuer></saml:Assertion>"#;
        let doc = ParserPool::new().parse(xml).unwrap();
        let doc = doc.borrow();
        let root = doc.document_element().unwrap();
        let issuer = doc.child_elements(root)[0];

        let fragment = node_to_string(&doc, issuer).unwrap();
        assert_eq!(
            fragment,
            r#"<saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">idp</saml:Issuer>"#
        );
    }

    #[test]
    fn test_document_has_declaration() {
        let doc = ParserPool::new().parse(b"<a/>").unwrap();
        let mut out = Vec::new();
        document_to_writer(&doc.borrow(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.ends_with("<a/>"));
    }
}
