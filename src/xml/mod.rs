//! XML object model and the marshalling engine
//!
//! Typed objects live in an [`XmlTree`] arena. Each object may cache the DOM
//! element it was last marshalled to (or unmarshalled from); any mutation
//! drops that cache for the object and every ancestor. The
//! [`ProviderRegistry`] maps element names to builders, marshallers and
//! unmarshallers.

pub mod any;
pub mod attribute_map;
pub mod kind;
pub mod marshaller;
pub mod registry;
pub mod support;
pub mod tree;
pub mod unmarshaller;

pub use any::XsAny;
pub use attribute_map::AttributeMap;
pub use kind::{
    AttributeExtensible, ChildPlacement, ElementPayload, ElementTag, IdBearing, KindOf,
    MarshalledAttribute, ObjectKind, Signable,
};
pub use marshaller::{marshall, marshall_into_document, marshall_into_parent, ElementMarshaller, Marshaller};
pub use registry::{KindBuilder, Provider, ProviderRegistry, XmlObjectBuilder};
pub use support::{
    clone_object, lookup_namespace_prefix, lookup_namespace_uri, marshall_to_string,
    marshall_to_writer, unmarshall_element, unmarshall_from_bytes, unmarshall_from_reader,
    CloneOutputOption,
};
pub use tree::{ObjectId, XmlObject, XmlTree};
pub use unmarshaller::{unmarshall, ElementUnmarshaller, Unmarshaller};
