//! Generic `xs:anyType` content

use super::attribute_map::AttributeMap;
use super::kind::{take_from_list, AttributeExtensible, ChildPlacement, ElementPayload, ElementTag};
use super::tree::ObjectId;
use crate::error::UnmarshallingError;

/// An element of unconstrained content: any attributes, text and children
#[derive(Debug, Default)]
pub struct XsAny {
    /// Text content
    pub text: Option<String>,
    /// Attributes
    pub attributes: AttributeMap,
    children: Vec<ObjectId>,
}

impl XsAny {
    /// Content-only element
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

impl ElementPayload for XsAny {
    fn text_content(&self) -> Option<String> {
        self.text.clone()
    }

    fn process_content(&mut self, text: &str) -> Result<(), UnmarshallingError> {
        self.text = Some(text.to_string());
        Ok(())
    }

    fn ordered_children(&self) -> Vec<ObjectId> {
        self.children.clone()
    }

    fn place_child(&mut self, child: ObjectId, _tag: ElementTag) -> ChildPlacement {
        self.children.push(child);
        ChildPlacement::Placed
    }

    fn remove_child(&mut self, child: ObjectId) -> bool {
        take_from_list(&mut self.children, child)
    }

    fn as_attribute_extensible(&self) -> Option<&dyn AttributeExtensible> {
        Some(self)
    }

    fn as_attribute_extensible_mut(&mut self) -> Option<&mut dyn AttributeExtensible> {
        Some(self)
    }
}

impl AttributeExtensible for XsAny {
    fn unknown_attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn unknown_attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }
}
