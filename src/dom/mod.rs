//! Arena DOM
//!
//! A small mutable document model sitting at the boundary between the object
//! engine and raw XML text. Nodes live in a per-document arena and are
//! addressed by [`NodeId`]; parent and child links are indices, so detaching,
//! moving and replacing nodes never creates reference cycles.
//!
//! Parsing is done by [`parser::ParserPool`], serialization by
//! [`serialize`].

pub mod parser;
pub mod serialize;

use crate::error::{Error, Result};
use crate::namespaces::{ns, Namespace, QName};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Index of a node inside its [`Document`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// An attribute node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Attribute name; the prefix is cosmetic
    pub name: QName,
    /// Attribute value (unescaped)
    pub value: String,
    /// Whether the attribute is bound as an XML ID
    pub is_id: bool,
}

/// Element payload
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Element name
    pub name: QName,
    /// Attributes in document order
    pub attributes: Vec<Attr>,
    /// Namespace declarations made on this element
    pub namespace_decls: Vec<Namespace>,
}

impl ElementData {
    fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespace_decls: Vec::new(),
        }
    }

    /// Element name
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Find an attribute by name
    pub fn attribute(&self, name: &QName) -> Option<&Attr> {
        self.attributes.iter().find(|a| &a.name == name)
    }
}

/// The kind of a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document node (always `NodeId(0)`)
    Document,
    /// An element
    Element(ElementData),
    /// Character data
    Text(String),
    /// A comment
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable XML document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (no document element)
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The document element, if one is set
    pub fn document_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::Structure(format!("no DOM node with index {}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::Structure(format!("no DOM node with index {}", id.0)))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.push(NodeKind::Element(ElementData::new(name)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(text.into()))
    }

    /// Node kind, `None` for an unknown id
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    /// Whether the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element(_)))
    }

    /// Element payload
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        match self.node_mut(id)?.kind {
            NodeKind::Element(ref mut e) => Ok(e),
            _ => Err(Error::Structure(format!("DOM node {} is not an element", id.0))),
        }
    }

    /// Parent node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Parent node when it is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    /// Child nodes in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Element children in document order
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Outermost ancestor of a node (the document node when rooted)
    pub fn top(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(p) = self.parent(current) {
            current = p;
        }
        current
    }

    /// Whether the node is reachable from the document node
    pub fn is_rooted(&self, id: NodeId) -> bool {
        self.top(id) == self.root()
    }

    /// Unlink a node from its parent; the subtree stays in the arena
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Append `child` as the last child of `parent`, moving it if attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::Structure(
                "cannot append a node beneath itself".to_string(),
            ));
        }
        if child == self.root() {
            return Err(Error::Structure("cannot append the document node".to_string()));
        }
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Replace `old` (a child of `parent`) with `new` in the same position
    pub fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> Result<()> {
        if new == old {
            return Ok(());
        }
        if self.is_ancestor_or_self(new, parent) {
            return Err(Error::Structure(
                "cannot insert a node beneath itself".to_string(),
            ));
        }
        self.detach(new)?;
        let position = self
            .node(parent)?
            .children
            .iter()
            .position(|&c| c == old)
            .ok_or_else(|| Error::Structure("node to replace is not a child".to_string()))?;
        self.node_mut(parent)?.children[position] = new;
        self.node_mut(new)?.parent = Some(parent);
        self.node_mut(old)?.parent = None;
        Ok(())
    }

    /// Make `element` the document element, replacing any existing one
    pub fn set_document_element(&mut self, element: NodeId) -> Result<()> {
        if !self.is_element(element) {
            return Err(Error::Structure(
                "document element must be an element".to_string(),
            ));
        }
        match self.document_element() {
            Some(existing) if existing == element => Ok(()),
            Some(existing) => self.replace_child(self.root(), element, existing),
            None => self.append_child(self.root(), element),
        }
    }

    /// Set (or replace) an attribute value
    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let element = self.element_mut(id)?;
        match element.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.name = name;
            }
            None => element.attributes.push(Attr {
                name,
                value,
                is_id: false,
            }),
        }
        Ok(())
    }

    /// Attribute value by name
    pub fn attribute(&self, id: NodeId, name: &QName) -> Option<&str> {
        self.element(id)
            .and_then(|e| e.attribute(name))
            .map(|a| a.value.as_str())
    }

    /// Remove an attribute; returns whether it existed
    pub fn remove_attribute(&mut self, id: NodeId, name: &QName) -> Result<bool> {
        let element = self.element_mut(id)?;
        let before = element.attributes.len();
        element.attributes.retain(|a| &a.name != name);
        Ok(element.attributes.len() != before)
    }

    /// Flag (or unflag) an existing attribute as an XML ID
    pub fn set_id_attribute(&mut self, id: NodeId, name: &QName, is_id: bool) -> Result<()> {
        let element = self.element_mut(id)?;
        let attr = element
            .attributes
            .iter_mut()
            .find(|a| &a.name == name)
            .ok_or_else(|| Error::Structure(format!("no attribute {} to flag as ID", name)))?;
        attr.is_id = is_id;
        Ok(())
    }

    /// Whether the named attribute is present and flagged as an ID
    pub fn is_id_attribute(&self, id: NodeId, name: &QName) -> bool {
        self.element(id)
            .and_then(|e| e.attribute(name))
            .map(|a| a.is_id)
            .unwrap_or(false)
    }

    /// Add a namespace declaration, replacing one for the same prefix
    pub fn declare_namespace(&mut self, id: NodeId, namespace: Namespace) -> Result<()> {
        let element = self.element_mut(id)?;
        element.namespace_decls.retain(|d| d.prefix != namespace.prefix);
        element.namespace_decls.push(namespace);
        Ok(())
    }

    /// Replace the text content of an element with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        let children = self.node(id)?.children.clone();
        for child in children {
            self.detach(child)?;
        }
        let text = text.into();
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(id, text_node)?;
        }
        Ok(())
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(NodeKind::Text(t)) = self.kind(node) {
                out.push_str(t);
            }
        }
        out
    }

    /// Concatenated text of direct text children only
    pub fn direct_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            if let Some(NodeKind::Text(t)) = self.kind(child) {
                out.push_str(t);
            }
        }
        out
    }

    /// The node and all its descendants in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            for &child in self.children(node).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Elements below `scope` (inclusive) carrying an ID-flagged attribute
    /// with the given value
    pub fn elements_by_id(&self, scope: NodeId, value: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| {
                self.element(n)
                    .map(|e| e.attributes.iter().any(|a| a.is_id && a.value == value))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Resolve a prefix (`None` for the default namespace) in scope at `id`
    pub fn lookup_namespace_uri(&self, id: NodeId, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(ns::XML.to_string());
        }
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node) {
                if let Some(decl) = element
                    .namespace_decls
                    .iter()
                    .find(|d| d.prefix.as_deref() == prefix)
                {
                    return if decl.uri.is_empty() {
                        None
                    } else {
                        Some(decl.uri.clone())
                    };
                }
            }
            current = self.parent(node);
        }
        None
    }

    /// Find a prefix bound to `uri` in scope at `id`.
    ///
    /// Returns `Some(None)` when `uri` is the in-scope default namespace.
    pub fn lookup_prefix(&self, id: NodeId, uri: &str) -> Option<Option<String>> {
        if uri == ns::XML {
            return Some(Some("xml".to_string()));
        }
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node) {
                for decl in &element.namespace_decls {
                    if decl.uri == uri
                        && self.lookup_namespace_uri(id, decl.prefix.as_deref()).as_deref() == Some(uri)
                    {
                        return Some(decl.prefix.clone());
                    }
                }
            }
            current = self.parent(node);
        }
        None
    }

    /// All namespace bindings in scope at `id`, innermost declaration wins.
    ///
    /// Undeclarations of the default namespace are reported with an empty URI.
    pub fn in_scope_namespaces(&self, id: NodeId) -> Vec<Namespace> {
        let mut seen: HashMap<Option<String>, Namespace> = HashMap::new();
        let mut order = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node) {
                for decl in &element.namespace_decls {
                    if !seen.contains_key(&decl.prefix) {
                        seen.insert(decl.prefix.clone(), decl.clone());
                        order.push(decl.prefix.clone());
                    }
                }
            }
            current = self.parent(node);
        }
        order
            .into_iter()
            .filter_map(|p| seen.remove(&p))
            .collect()
    }

    /// Deep-copy a subtree within this document; the copy is detached
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId> {
        let source = self.clone();
        let (copy, _) = self.import_node(&source, id)?;
        Ok(copy)
    }

    /// Deep-copy a subtree from another document into this one.
    ///
    /// The copy is detached. Bindings the subtree inherited from ancestors in
    /// the source are redeclared on the copied apex element. Returns the new
    /// apex and a map from source node ids to copied node ids.
    pub fn import_node(
        &mut self,
        source: &Document,
        id: NodeId,
    ) -> Result<(NodeId, HashMap<NodeId, NodeId>)> {
        let mut mapping = HashMap::new();
        let apex = self.import_rec(source, id, &mut mapping)?;

        if source.is_element(id) {
            let inherited = source.in_scope_namespaces(id);
            let element = self.element_mut(apex)?;
            for decl in inherited {
                if decl.uri.is_empty() && decl.prefix.is_none() {
                    continue;
                }
                if !element.namespace_decls.iter().any(|d| d.prefix == decl.prefix) {
                    element.namespace_decls.push(decl);
                }
            }
        }
        Ok((apex, mapping))
    }

    fn import_rec(
        &mut self,
        source: &Document,
        id: NodeId,
        mapping: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        let kind = match &source.node(id)?.kind {
            NodeKind::Document => {
                return Err(Error::Structure("cannot import a document node".to_string()))
            }
            other => other.clone(),
        };
        let copy = self.push(kind);
        mapping.insert(id, copy);
        for &child in source.children(id) {
            let child_copy = self.import_rec(source, child, mapping)?;
            self.node_mut(copy)?.children.push(child_copy);
            self.node_mut(child_copy)?.parent = Some(copy);
        }
        Ok(copy)
    }
}

/// Shared handle to a document
pub type DocumentRef = Rc<RefCell<Document>>;

/// Create a new, empty shared document
pub fn new_document() -> DocumentRef {
    Rc::new(RefCell::new(Document::new()))
}

/// A handle to one element of a shared document.
///
/// This is what an XML object caches: cloning the handle shares the same
/// node, and [`DomElement::is_same_node`] tests node identity.
#[derive(Clone)]
pub struct DomElement {
    doc: DocumentRef,
    node: NodeId,
}

impl DomElement {
    /// Wrap a node of a shared document
    pub fn new(doc: DocumentRef, node: NodeId) -> Self {
        Self { doc, node }
    }

    /// The owning document
    pub fn document(&self) -> &DocumentRef {
        &self.doc
    }

    /// The node index
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Node identity (same document and same node)
    pub fn is_same_node(&self, other: &DomElement) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.node == other.node
    }

    /// Whether `other` lives in the same document
    pub fn same_document(&self, other: &DocumentRef) -> bool {
        Rc::ptr_eq(&self.doc, other)
    }

    /// Element name
    pub fn name(&self) -> Option<QName> {
        self.doc.borrow().element(self.node).map(|e| e.name().clone())
    }

    /// Attribute value
    pub fn attribute(&self, name: &QName) -> Option<String> {
        self.doc.borrow().attribute(self.node, name).map(str::to_string)
    }

    /// Whether the attribute is present and flagged as an XML ID
    pub fn is_id_attribute(&self, name: &QName) -> bool {
        self.doc.borrow().is_id_attribute(self.node, name)
    }

    /// Parent element, if any
    pub fn parent_element(&self) -> Option<DomElement> {
        let parent = self.doc.borrow().parent_element(self.node)?;
        Some(DomElement::new(self.doc.clone(), parent))
    }

    /// Child elements in document order
    pub fn child_elements(&self) -> Vec<DomElement> {
        self.doc
            .borrow()
            .child_elements(self.node)
            .into_iter()
            .map(|n| DomElement::new(self.doc.clone(), n))
            .collect()
    }

    /// Whether this element is the document element of its document
    pub fn is_document_element(&self) -> bool {
        self.doc.borrow().document_element() == Some(self.node)
    }

    /// Concatenated descendant text
    pub fn text_content(&self) -> String {
        self.doc.borrow().text_content(self.node)
    }
}

impl fmt::Debug for DomElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().map(|n| n.to_string()).unwrap_or_default();
        f.debug_struct("DomElement")
            .field("node", &self.node.0)
            .field("name", &name)
            .finish()
    }
}
