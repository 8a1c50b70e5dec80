//! Canonical XML 1.0, inclusive and exclusive, over the in-memory DOM
//!
//! Canonicalization runs on the already-parsed tree. The node set is the
//! subtree rooted at the apex minus an optional excluded subtree (the
//! enveloped `ds:Signature`).

use super::algorithm::C14nMethod;
use crate::dom::{Document, NodeId, NodeKind};
use crate::error::SignatureError;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Escape text node content
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
struct NsDecl {
    prefix: String,
    uri: String,
}

impl NsDecl {
    fn render(&self, out: &mut String) {
        if self.prefix.is_empty() {
            out.push_str(&format!(" xmlns=\"{}\"", escape_attr(&self.uri)));
        } else {
            out.push_str(&format!(" xmlns:{}=\"{}\"", self.prefix, escape_attr(&self.uri)));
        }
    }
}

impl Ord for NsDecl {
    // default namespace first, then by prefix
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RenderedAttr {
    ns_uri: String,
    local_name: String,
    qualified_name: String,
    value: String,
}

impl Ord for RenderedAttr {
    // unqualified attributes first, then by (namespace URI, local name)
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for RenderedAttr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonicalize the subtree at `apex` (an element or the document node).
///
/// `inclusive_prefixes` is the exclusive-c14n InclusiveNamespaces
/// PrefixList, where `#default` names the default namespace; it is ignored
/// by the inclusive methods.
pub fn canonicalize(
    doc: &Document,
    apex: NodeId,
    method: C14nMethod,
    exclude: Option<NodeId>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, SignatureError> {
    let mut ctx = Canonicalizer {
        doc,
        method,
        exclude,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
        out: String::new(),
    };
    match doc.kind(apex) {
        Some(NodeKind::Document) => {
            for &child in doc.children(apex) {
                ctx.top_level(child)?;
            }
        }
        Some(NodeKind::Element(_)) => ctx.element(apex, &BTreeMap::new())?,
        _ => {
            return Err(SignatureError::Canonicalization(
                "apex must be an element or a document".to_string(),
            ))
        }
    }
    Ok(ctx.out.into_bytes())
}

struct Canonicalizer<'a> {
    doc: &'a Document,
    method: C14nMethod,
    exclude: Option<NodeId>,
    inclusive_prefixes: HashSet<String>,
    out: String,
}

impl<'a> Canonicalizer<'a> {
    fn top_level(&mut self, id: NodeId) -> Result<(), SignatureError> {
        let siblings = self.doc.children(self.doc.root());
        let position = siblings.iter().position(|&c| c == id).unwrap_or(0);
        let element_before = siblings[..position].iter().any(|&c| self.doc.is_element(c));
        let element_after = siblings[position + 1..].iter().any(|&c| self.doc.is_element(c));
        match self.doc.kind(id) {
            Some(NodeKind::Element(_)) => self.element(id, &BTreeMap::new()),
            Some(NodeKind::Comment(text)) if self.method.with_comments() => {
                if element_before {
                    self.out.push('\n');
                }
                self.out.push_str(&format!("<!--{}-->", text));
                if element_after {
                    self.out.push('\n');
                }
                Ok(())
            }
            // whitespace outside the document element is not part of the canonical form
            _ => Ok(()),
        }
    }

    fn node(&mut self, id: NodeId, rendered: &BTreeMap<String, String>) -> Result<(), SignatureError> {
        if Some(id) == self.exclude {
            return Ok(());
        }
        match self.doc.kind(id) {
            Some(NodeKind::Element(_)) => self.element(id, rendered),
            Some(NodeKind::Text(text)) => {
                self.out.push_str(&escape_text(text));
                Ok(())
            }
            Some(NodeKind::Comment(text)) => {
                if self.method.with_comments() {
                    self.out.push_str(&format!("<!--{}-->", text));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn in_scope(&self, id: NodeId) -> BTreeMap<String, String> {
        self.doc
            .in_scope_namespaces(id)
            .into_iter()
            .filter(|n| n.prefix.as_deref() != Some("xml"))
            .map(|n| (n.prefix.unwrap_or_default(), n.uri))
            .collect()
    }

    fn namespace_declarations(
        &self,
        id: NodeId,
        rendered: &BTreeMap<String, String>,
    ) -> Result<Vec<NsDecl>, SignatureError> {
        let element = self.element_data(id)?;
        let in_scope = self.in_scope(id);

        let candidates: Vec<String> = if self.method.is_exclusive() {
            let mut utilized: HashSet<String> = HashSet::new();
            utilized.insert(element.name.prefix.clone().unwrap_or_default());
            for attr in &element.attributes {
                if let Some(prefix) = &attr.name.prefix {
                    utilized.insert(prefix.clone());
                }
            }
            utilized.extend(self.inclusive_prefixes.iter().cloned());
            utilized.into_iter().collect()
        } else {
            let mut all: Vec<String> = in_scope.keys().cloned().collect();
            if !all.iter().any(|p| p.is_empty()) {
                all.push(String::new());
            }
            all
        };

        let mut decls = Vec::new();
        for prefix in candidates {
            if prefix == "xml" {
                continue;
            }
            match in_scope.get(&prefix).filter(|uri| !uri.is_empty()) {
                Some(uri) => {
                    if rendered.get(&prefix) != Some(uri) {
                        decls.push(NsDecl { prefix, uri: uri.clone() });
                    }
                }
                None if prefix.is_empty() => {
                    let previously = rendered.get("").map(|u| !u.is_empty()).unwrap_or(false);
                    if previously {
                        decls.push(NsDecl {
                            prefix,
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }
        decls.sort();
        Ok(decls)
    }

    fn element_data(&self, id: NodeId) -> Result<&'a crate::dom::ElementData, SignatureError> {
        self.doc
            .element(id)
            .ok_or_else(|| SignatureError::Canonicalization(format!("node {} is not an element", id.index())))
    }

    fn attributes(&self, id: NodeId) -> Result<Vec<RenderedAttr>, SignatureError> {
        let element = self.element_data(id)?;
        let mut attrs = Vec::with_capacity(element.attributes.len());
        for attr in &element.attributes {
            let ns_uri = attr.name.namespace().unwrap_or("").to_string();
            let qualified_name = match (&attr.name.prefix, ns_uri.is_empty()) {
                (Some(prefix), false) => format!("{}:{}", prefix, attr.name.local_name),
                (None, false) => match self.doc.lookup_prefix(id, &ns_uri) {
                    Some(Some(prefix)) => format!("{}:{}", prefix, attr.name.local_name),
                    _ => {
                        return Err(SignatureError::Canonicalization(format!(
                            "no prefix bound for attribute {}",
                            attr.name
                        )))
                    }
                },
                _ => attr.name.local_name.clone(),
            };
            attrs.push(RenderedAttr {
                ns_uri,
                local_name: attr.name.local_name.clone(),
                qualified_name,
                value: attr.value.clone(),
            });
        }
        attrs.sort();
        Ok(attrs)
    }

    fn element(
        &mut self,
        id: NodeId,
        rendered: &BTreeMap<String, String>,
    ) -> Result<(), SignatureError> {
        if Some(id) == self.exclude {
            return Ok(());
        }
        let name = self.element_data(id)?.name.qualified();
        let decls = self.namespace_declarations(id, rendered)?;
        let attrs = self.attributes(id)?;

        self.out.push('<');
        self.out.push_str(&name);
        for decl in &decls {
            decl.render(&mut self.out);
        }
        for attr in &attrs {
            self.out.push_str(&format!(
                " {}=\"{}\"",
                attr.qualified_name,
                escape_attr(&attr.value)
            ));
        }
        self.out.push('>');

        let mut child_rendered = rendered.clone();
        for decl in decls {
            child_rendered.insert(decl.prefix, decl.uri);
        }
        for &child in self.doc.children(id) {
            self.node(child, &child_rendered)?;
        }

        self.out.push_str("</");
        self.out.push_str(&name);
        self.out.push('>');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::ParserPool;
    use pretty_assertions::assert_eq;

    fn c14n(xml: &str, method: C14nMethod, prefixes: &[String]) -> String {
        let doc = ParserPool::new().parse(xml.as_bytes()).unwrap();
        let doc = doc.borrow();
        let root = doc.document_element().unwrap();
        let apex = doc.child_elements(root).first().copied().unwrap_or(root);
        String::from_utf8(canonicalize(&doc, apex, method, None, prefixes).unwrap()).unwrap()
    }

    #[test]
    fn test_attribute_order_and_empty_elements() {
        let doc = ParserPool::new()
            .parse(br#"<r xmlns:b="urn:b" z="1" b:y="2" a="3"><e/></r>"#)
            .unwrap();
        let doc = doc.borrow();
        let root = doc.document_element().unwrap();
        let out = canonicalize(&doc, doc.root(), C14nMethod::Exclusive, None, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<r xmlns:b="urn:b" a="3" z="1" b:y="2"><e></e></r>"#
        );
        assert!(doc.is_element(root));
    }

    #[test]
    fn test_exclusive_drops_unused_namespaces() {
        let xml = r#"<a:r xmlns:a="urn:a" xmlns:u="urn:unused"><a:c x="1">t</a:c></a:r>"#;
        assert_eq!(
            c14n(xml, C14nMethod::Exclusive, &[]),
            r#"<a:c xmlns:a="urn:a" x="1">t</a:c>"#
        );
        assert_eq!(
            c14n(xml, C14nMethod::Inclusive, &[]),
            r#"<a:c xmlns:a="urn:a" xmlns:u="urn:unused" x="1">t</a:c>"#
        );
        assert_eq!(
            c14n(xml, C14nMethod::Exclusive, &["u".to_string()]),
            r#"<a:c xmlns:a="urn:a" xmlns:u="urn:unused" x="1">t</a:c>"#
        );
    }

    #[test]
    fn test_comments_and_escaping() {
        let xml = "<r><c a=\"x&amp;&quot;\">1 &lt; 2<!--note--></c></r>";
        assert_eq!(
            c14n(xml, C14nMethod::Exclusive, &[]),
            "<c a=\"x&amp;&quot;\">1 &lt; 2</c>"
        );
        assert_eq!(
            c14n(xml, C14nMethod::ExclusiveWithComments, &[]),
            "<c a=\"x&amp;&quot;\">1 &lt; 2<!--note--></c>"
        );
    }

    #[test]
    fn test_excluded_subtree_is_skipped() {
        let doc = ParserPool::new().parse(b"<r><keep/><drop><x/></drop></r>").unwrap();
        let doc = doc.borrow();
        let root = doc.document_element().unwrap();
        let drop = doc.child_elements(root)[1];
        let out = canonicalize(&doc, root, C14nMethod::Exclusive, Some(drop), &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<r><keep></keep></r>");
    }
}
