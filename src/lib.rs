//! # samlkit
//!
//! SAML 1.x / 2.0 and WS-Security object model with DOM marshalling, XML
//! signatures and assertion validation.
//!
//! ## Features
//!
//! - Typed object tree bound to XML elements, with a cached DOM that is
//!   reused until the object (or a descendant) changes
//! - Marshalling and unmarshalling through a per-instance provider registry
//! - Enveloped XML signatures (RSA and HMAC) over exclusive or inclusive
//!   canonicalization, computed on the in-memory DOM
//! - Signature profile checks against signature wrapping
//! - Ordered validator chains for assertions, conditions and subject
//!   confirmation
//! - Protection against XML attacks (size, depth and DOCTYPE limits)
//!
//! ## Example
//!
//! ```rust,ignore
//! use samlkit::config::Config;
//! use samlkit::validation::saml2::standard_saml2_assertion_chain;
//! use samlkit::xml::{unmarshall_from_bytes, XmlTree};
//!
//! let config = Config::default();
//! let registry = config.build_registry()?;
//! let pool = config.build_parser_pool();
//!
//! let mut tree = XmlTree::new();
//! let assertion = unmarshall_from_bytes(&mut tree, &registry, &pool, xml)?;
//! let mut ctx = config.validation_context();
//! let result = standard_saml2_assertion_chain(Some(credential)).validate(&tree, assertion, &mut ctx)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;
pub mod names;
pub mod namespaces;
pub mod config;

// DOM boundary
pub mod dom;

// Object model and marshalling
pub mod xml;
pub mod saml;

// Signatures
pub mod xmlsec;

// Validation
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use validation::{ValidationContext, ValidationResult, Validator, ValidatorChain};
pub use xml::{ObjectId, ProviderRegistry, XmlTree};

/// Version of the samlkit library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
