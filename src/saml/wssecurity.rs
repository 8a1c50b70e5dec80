//! WS-Security utility bindings (`wsu:Timestamp`)

use super::{format_instant, parse_instant};
use crate::error::UnmarshallingError;
use crate::namespaces::{ns, QName};
use crate::xml::attribute_map::AttributeMap;
use crate::xml::kind::{
    place_in_slot, take_from_slot, AttributeExtensible, ChildPlacement, ElementPayload,
    ElementTag, IdBearing, MarshalledAttribute,
};
use crate::xml::tree::ObjectId;
use chrono::{DateTime, Utc};

fn wsu_id() -> QName {
    QName::prefixed(ns::WSU, "Id", ns::WSU_PREFIX)
}

/// `wsu:Timestamp`
#[derive(Debug, Default)]
pub struct Timestamp {
    /// `wsu:Id`
    pub id: Option<String>,
    /// Extension attributes
    pub attributes: AttributeMap,
    created: Option<ObjectId>,
    expires: Option<ObjectId>,
}

impl Timestamp {
    /// `wsu:Created` child
    pub fn created(&self) -> Option<ObjectId> {
        self.created
    }

    /// `wsu:Expires` child
    pub fn expires(&self) -> Option<ObjectId> {
        self.expires
    }
}

impl ElementPayload for Timestamp {
    fn marshall_attributes(&self, out: &mut Vec<MarshalledAttribute>) {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            out.push(MarshalledAttribute::named(wsu_id(), id).id(true));
        }
    }

    fn process_attribute(&mut self, name: &QName, value: &str) -> Result<bool, UnmarshallingError> {
        if *name == wsu_id() {
            self.id = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn is_id_attribute(&self, name: &QName) -> bool {
        *name == wsu_id()
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.created.into_iter().chain(self.expires).collect()
    }

    fn place_child(&mut self, child: ObjectId, tag: ElementTag) -> ChildPlacement {
        match tag {
            ElementTag::Created => place_in_slot(&mut self.created, child),
            ElementTag::Expires => place_in_slot(&mut self.expires, child),
            _ => ChildPlacement::Rejected,
        }
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_slot(&mut self.created, child) || take_from_slot(&mut self.expires, child)
    }

    fn as_id_bearing(&self) -> Option<&dyn IdBearing> {
        Some(self)
    }

    fn as_id_bearing_mut(&mut self) -> Option<&mut dyn IdBearing> {
        Some(self)
    }

    fn as_attribute_extensible(&self) -> Option<&dyn AttributeExtensible> {
        Some(self)
    }

    fn as_attribute_extensible_mut(&mut self) -> Option<&mut dyn AttributeExtensible> {
        Some(self)
    }
}

impl IdBearing for Timestamp {
    fn xml_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_xml_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn id_attribute_name(&self) -> QName {
        wsu_id()
    }
}

impl AttributeExtensible for Timestamp {
    fn unknown_attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn unknown_attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }
}

macro_rules! instant_element {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq)]
        pub struct $name {
            /// The instant
            pub value: Option<DateTime<Utc>>,
        }

        impl $name {
            /// Element carrying the given instant
            pub fn new(value: DateTime<Utc>) -> Self {
                Self { value: Some(value) }
            }
        }

        impl ElementPayload for $name {
            fn text_content(&self) -> Option<String> {
                self.value.as_ref().map(format_instant)
            }

            fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
                self.value = Some(parse_instant(text)?);
                Ok(())
            }
        }
    };
}

instant_element! {
    /// `wsu:Created`
    Created
}

instant_element! {
    /// `wsu:Expires`
    Expires
}
