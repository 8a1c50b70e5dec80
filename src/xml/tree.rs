//! The XML object arena
//!
//! Objects live in an [`XmlTree`] and are addressed by [`ObjectId`]. Parent
//! links are plain indices and child lists live inside payloads, so the
//! parent/child relation carries no ownership cycle and ancestor walks are
//! O(depth).
//!
//! Every mutation goes through the tree, which drops the cached DOM of the
//! mutated object and of every ancestor before the change is applied. A
//! cached DOM element is therefore always a faithful serialization of the
//! object's current state, which is what makes the marshaller's
//! "return the cached element" fast path sound.

use super::kind::{ChildPlacement, ElementPayload, ElementTag, KindOf, ObjectKind};
use crate::dom::DomElement;
use crate::error::{Error, Result};
use crate::namespaces::{ns, Namespace, QName};
use indexmap::IndexSet;
use std::fmt;
use tracing::trace;

/// Handle to an object in an [`XmlTree`].
///
/// Slots freed by [`XmlTree::discard`] are reused; the generation keeps a
/// handle to a discarded object from resolving to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: usize,
    generation: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

/// One typed node of the object tree
#[derive(Debug)]
pub struct XmlObject {
    element_name: QName,
    schema_type: Option<QName>,
    namespaces: IndexSet<Namespace>,
    parent: Option<ObjectId>,
    dom: Option<DomElement>,
    kind: ObjectKind,
}

impl XmlObject {
    /// Element name
    pub fn element_name(&self) -> &QName {
        &self.element_name
    }

    /// Schema type (`xsi:type`), if any
    pub fn schema_type(&self) -> Option<&QName> {
        self.schema_type.as_ref()
    }

    /// Namespaces declared by this object
    pub fn namespaces(&self) -> &IndexSet<Namespace> {
        &self.namespaces
    }

    /// Parent object
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Cached DOM element, if still valid
    pub fn dom(&self) -> Option<&DomElement> {
        self.dom.as_ref()
    }

    /// The typed payload
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Kind discriminant
    pub fn tag(&self) -> ElementTag {
        self.kind.tag()
    }

    /// Payload as a trait object
    pub fn payload(&self) -> &dyn ElementPayload {
        self.kind.payload()
    }

    /// Children in schema order
    pub fn ordered_children(&self) -> Vec<ObjectId> {
        self.kind.payload().ordered_children()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<XmlObject>,
}

/// Arena owning a forest of XML objects
#[derive(Debug, Default)]
pub struct XmlTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl XmlTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no object is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a detached object under its kind's default element name
    pub fn add<T: KindOf>(&mut self, payload: T) -> ObjectId {
        self.add_named(T::default_element_name(), payload.into_kind())
    }

    /// Add a detached object with an explicit element name
    pub fn add_named(&mut self, element_name: QName, kind: ObjectKind) -> ObjectId {
        let mut namespaces = IndexSet::new();
        if let Some(uri) = element_name.namespace() {
            namespaces.insert(Namespace::new(uri, element_name.prefix.clone()));
        }
        let object = XmlObject {
            element_name,
            schema_type: None,
            namespaces,
            parent: None,
            dom: None,
            kind,
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.object = Some(object);
                ObjectId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ObjectId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Whether the handle refers to a live object
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_ok()
    }

    /// Borrow an object
    pub fn get(&self, id: ObjectId) -> Result<&XmlObject> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.object.as_ref())
            .ok_or_else(|| Error::Structure(format!("no XML object {}", id)))
    }

    fn get_mut(&mut self, id: ObjectId) -> Result<&mut XmlObject> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.object.as_mut())
            .ok_or_else(|| Error::Structure(format!("no XML object {}", id)))
    }

    /// Borrow a typed payload
    pub fn payload<T: KindOf>(&self, id: ObjectId) -> Result<&T> {
        let object = self.get(id)?;
        T::from_kind(&object.kind).ok_or_else(|| {
            Error::Structure(format!(
                "{} is a {:?}, not a {:?}",
                object.element_name,
                object.kind.tag(),
                T::TAG
            ))
        })
    }

    /// Mutate a typed payload.
    ///
    /// The cached DOM of the object and all its ancestors is dropped before
    /// `f` runs.
    pub fn modify<T: KindOf, R>(&mut self, id: ObjectId, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.payload::<T>(id)?;
        self.invalidate(id)?;
        let payload = self.payload_mut_raw::<T>(id)?;
        Ok(f(payload))
    }

    /// Mutable typed payload without touching the DOM cache
    pub(crate) fn payload_mut_raw<T: KindOf>(&mut self, id: ObjectId) -> Result<&mut T> {
        let object = self.get_mut(id)?;
        let tag = object.kind.tag();
        T::from_kind_mut(&mut object.kind)
            .ok_or_else(|| Error::Structure(format!("{:?} is not a {:?}", tag, T::TAG)))
    }

    /// Mutable payload trait object without touching the DOM cache
    pub(crate) fn kind_mut_raw(&mut self, id: ObjectId) -> Result<&mut dyn ElementPayload> {
        Ok(self.get_mut(id)?.kind.payload_mut())
    }

    /// Parent object
    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.get(id).ok().and_then(|o| o.parent)
    }

    /// Children in schema order
    pub fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.get(id).map(|o| o.ordered_children()).unwrap_or_default()
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// The outermost ancestor (or the object itself)
    pub fn root_of(&self, id: ObjectId) -> ObjectId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// The object and all its descendants, parents before children
    pub fn descendants(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            for child in self.children(current).into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Cached DOM element of an object
    pub fn dom(&self, id: ObjectId) -> Option<DomElement> {
        self.get(id).ok().and_then(|o| o.dom.clone())
    }

    /// Value of the object's XML ID attribute
    pub fn xml_id(&self, id: ObjectId) -> Option<&str> {
        self.get(id)
            .ok()
            .and_then(|o| o.kind.payload().as_id_bearing())
            .and_then(|b| b.xml_id())
    }

    /// Set the object's XML ID attribute
    pub fn set_xml_id(&mut self, id: ObjectId, value: Option<String>) -> Result<()> {
        let name = self.get(id)?.element_name.clone();
        if self.get(id)?.kind.payload().as_id_bearing().is_none() {
            return Err(Error::Structure(format!("{} has no ID attribute", name)));
        }
        self.invalidate(id)?;
        // the enveloped signature's Reference URI names this ID
        if let Some(signature) = self.signature_of(id) {
            self.release_dom(signature)?;
        }
        if let Some(bearer) = self.get_mut(id)?.kind.payload_mut().as_id_bearing_mut() {
            bearer.set_xml_id(value);
        }
        Ok(())
    }

    /// The `ds:Signature` child of a signable object
    pub fn signature_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.get(id)
            .ok()
            .and_then(|o| o.kind.payload().as_signable())
            .and_then(|s| s.signature())
    }

    /// Set or clear the `xsi:type` of an object
    pub fn set_schema_type(&mut self, id: ObjectId, schema_type: Option<QName>) -> Result<()> {
        self.invalidate(id)?;
        let object = self.get_mut(id)?;
        if let Some(t) = &schema_type {
            object
                .namespaces
                .insert(Namespace::new(ns::XSI, Some(ns::XSI_PREFIX)));
            if let Some(uri) = t.namespace() {
                object.namespaces.insert(Namespace::new(uri, t.prefix.clone()));
            }
        }
        object.schema_type = schema_type;
        Ok(())
    }

    /// Declare a namespace on an object
    pub fn add_namespace(&mut self, id: ObjectId, namespace: Namespace) -> Result<()> {
        if self.get(id)?.namespaces.contains(&namespace) {
            return Ok(());
        }
        self.invalidate(id)?;
        self.get_mut(id)?.namespaces.insert(namespace);
        Ok(())
    }

    pub(crate) fn init_unmarshalled(
        &mut self,
        id: ObjectId,
        schema_type: Option<QName>,
        namespaces: Vec<Namespace>,
    ) -> Result<()> {
        let object = self.get_mut(id)?;
        object.schema_type = schema_type;
        object.namespaces.extend(namespaces);
        Ok(())
    }

    /// Make `child` a child of `parent`.
    ///
    /// The child is first detached from any previous parent. A child that
    /// evicts the occupant of a single-valued slot leaves the evicted object
    /// detached. If `parent` does not accept the child's kind the call fails
    /// and the child is left detached.
    pub fn attach(&mut self, parent: ObjectId, child: ObjectId) -> Result<()> {
        let tag = self.get(child)?.tag();
        self.get(parent)?;
        if parent == child || self.ancestors(parent).contains(&child) {
            return Err(Error::Structure(format!(
                "attaching {} under {} would create a cycle",
                child, parent
            )));
        }
        if let Some(current) = self.get(child)?.parent {
            if current == parent {
                return Ok(());
            }
            self.detach(child)?;
        }

        self.invalidate(parent)?;
        let placement = self.get_mut(parent)?.kind.payload_mut().place_child(child, tag);
        match placement {
            ChildPlacement::Placed => {}
            ChildPlacement::Replaced(old) => {
                if let Ok(evicted) = self.get_mut(old) {
                    evicted.parent = None;
                }
            }
            ChildPlacement::Rejected => {
                let parent_name = &self.get(parent)?.element_name;
                let child_name = &self.get(child)?.element_name;
                return Err(Error::Structure(format!(
                    "{} does not accept a {} child",
                    parent_name, child_name
                )));
            }
        }
        self.get_mut(child)?.parent = Some(parent);
        trace!(%parent, %child, "attached child object");
        Ok(())
    }

    /// Unlink an object from its parent.
    ///
    /// The parent chain loses its cached DOM; the detached object keeps its
    /// own cache.
    pub fn detach(&mut self, child: ObjectId) -> Result<()> {
        let Some(parent) = self.get(child)?.parent else {
            return Ok(());
        };
        self.invalidate(parent)?;
        self.get_mut(parent)?.kind.payload_mut().remove_child(child);
        self.get_mut(child)?.parent = None;
        Ok(())
    }

    /// Remove an object and its whole subtree from the arena, making their
    /// slots available to later additions
    pub fn discard(&mut self, id: ObjectId) -> Result<()> {
        self.detach(id)?;
        for object in self.descendants(id) {
            if let Some(slot) = self.slots.get_mut(object.index) {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(object.index);
            }
        }
        Ok(())
    }

    /// Drop the cached DOM of an object and of every ancestor
    pub fn invalidate(&mut self, id: ObjectId) -> Result<()> {
        self.release_dom(id)?;
        self.release_parent_dom(id)
    }

    /// Drop the cached DOM of this object only
    pub fn release_dom(&mut self, id: ObjectId) -> Result<()> {
        let object = self.get_mut(id)?;
        if object.dom.take().is_some() {
            trace!(object = %id, "released cached DOM");
        }
        Ok(())
    }

    /// Drop the cached DOM of every ancestor
    pub fn release_parent_dom(&mut self, id: ObjectId) -> Result<()> {
        for ancestor in self.ancestors(id) {
            self.release_dom(ancestor)?;
        }
        Ok(())
    }

    /// Drop the cached DOM of every descendant
    pub fn release_children_dom(&mut self, id: ObjectId) -> Result<()> {
        for descendant in self.descendants(id).into_iter().skip(1) {
            self.release_dom(descendant)?;
        }
        Ok(())
    }

    pub(crate) fn set_dom(&mut self, id: ObjectId, dom: DomElement) -> Result<()> {
        self.get_mut(id)?.dom = Some(dom);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{new_document, DomElement};
    use crate::saml::saml2::{Assertion, Issuer, Subject};
    use crate::xmlsec::signature::Signature;

    fn fake_dom() -> DomElement {
        let doc = new_document();
        let node = doc.borrow_mut().create_element(QName::local("x"));
        DomElement::new(doc, node)
    }

    #[test]
    fn test_attach_and_replace_single_slot() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        let first = tree.add(Issuer::new("https://idp.example.org"));
        let second = tree.add(Issuer::new("https://other.example.org"));

        tree.attach(assertion, first).unwrap();
        assert_eq!(tree.parent(first), Some(assertion));
        tree.attach(assertion, second).unwrap();
        assert_eq!(tree.parent(second), Some(assertion));
        assert_eq!(tree.parent(first), None);
        assert_eq!(tree.payload::<Assertion>(assertion).unwrap().issuer(), Some(second));
    }

    #[test]
    fn test_attach_rejects_illegal_child() {
        let mut tree = XmlTree::new();
        let issuer = tree.add(Issuer::new("idp"));
        let subject = tree.add(Subject::default());
        assert!(matches!(tree.attach(issuer, subject), Err(Error::Structure(_))));
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        assert!(tree.attach(assertion, assertion).is_err());
    }

    #[test]
    fn test_invalidation_reaches_every_ancestor() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        let subject = tree.add(Subject::default());
        let signature = tree.add(Signature::default());
        tree.attach(assertion, subject).unwrap();
        tree.attach(assertion, signature).unwrap();
        for id in [assertion, subject, signature] {
            tree.set_dom(id, fake_dom()).unwrap();
        }

        // a released middle ancestor must not stop propagation
        tree.release_dom(assertion).unwrap();
        tree.set_dom(assertion, fake_dom()).unwrap();
        tree.release_dom(subject).unwrap();
        tree.invalidate(subject).unwrap();

        assert!(tree.dom(assertion).is_none());
        assert!(tree.dom(signature).is_some());
    }

    #[test]
    fn test_detach_keeps_child_cache() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        let issuer = tree.add(Issuer::new("idp"));
        tree.attach(assertion, issuer).unwrap();
        tree.set_dom(assertion, fake_dom()).unwrap();
        tree.set_dom(issuer, fake_dom()).unwrap();

        tree.detach(issuer).unwrap();
        assert!(tree.dom(issuer).is_some());
        assert!(tree.dom(assertion).is_none());
        assert_eq!(tree.parent(issuer), None);
        assert_eq!(tree.payload::<Assertion>(assertion).unwrap().issuer(), None);
    }

    #[test]
    fn test_set_xml_id_invalidates() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        tree.set_dom(assertion, fake_dom()).unwrap();
        tree.set_xml_id(assertion, Some("Other".to_string())).unwrap();
        assert!(tree.dom(assertion).is_none());
        assert_eq!(tree.xml_id(assertion), Some("Other"));

        let issuer = tree.add(Issuer::new("idp"));
        assert!(tree.set_xml_id(issuer, Some("x".to_string())).is_err());
    }

    #[test]
    fn test_set_xml_id_releases_enveloped_signature() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("m1"));
        let issuer = tree.add(Issuer::new("idp"));
        let signature = tree.add(Signature::default());
        tree.attach(assertion, issuer).unwrap();
        tree.attach(assertion, signature).unwrap();
        for id in [assertion, issuer, signature] {
            tree.set_dom(id, fake_dom()).unwrap();
        }

        tree.set_xml_id(assertion, Some("m2".to_string())).unwrap();
        assert!(tree.dom(assertion).is_none());
        assert!(tree.dom(signature).is_none());
        assert!(tree.dom(issuer).is_some());
    }

    #[test]
    fn test_discard_frees_subtree() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        let subject = tree.add(Subject::default());
        tree.attach(assertion, subject).unwrap();
        assert_eq!(tree.len(), 2);
        tree.discard(assertion).unwrap();
        assert!(tree.is_empty());
        assert!(tree.get(subject).is_err());
    }

    #[test]
    fn test_discarded_slots_are_reused() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::default());
        let subject = tree.add(Subject::default());
        tree.attach(assertion, subject).unwrap();
        tree.discard(assertion).unwrap();

        let issuer = tree.add(Issuer::new("idp"));
        let other = tree.add(Issuer::new("idp2"));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.slots.len(), 2);

        // stale handles never resolve to the objects now in their slots
        assert!(!tree.contains(assertion));
        assert!(!tree.contains(subject));
        assert!(tree.payload::<Issuer>(issuer).is_ok());
        assert!(tree.payload::<Issuer>(other).is_ok());
        assert_ne!(issuer, subject);
        assert_ne!(other, assertion);
    }

    #[test]
    fn test_modify_checks_kind() {
        let mut tree = XmlTree::new();
        let issuer = tree.add(Issuer::new("idp"));
        assert!(tree.modify::<Assertion, _>(issuer, |_| ()).is_err());
        tree.modify::<Issuer, _>(issuer, |i| i.value = Some("other".into())).unwrap();
        assert_eq!(tree.payload::<Issuer>(issuer).unwrap().value.as_deref(), Some("other"));
    }
}
