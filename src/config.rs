//! Library configuration
//!
//! A [`Config`] gathers the knobs that would otherwise be process-wide state:
//! parser limits and pooling, the set of ID-typed attribute names known to a
//! registry, and validation defaults. It deserializes from JSON so a service
//! can keep it next to its other settings.

use crate::dom::parser::{ParserPool, DEFAULT_POOL_SIZE};
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::namespaces::QName;
use crate::validation::{keys, ParameterValue, ValidationContext};
use crate::xml::registry::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Idle parser states kept by the parser pool
    pub parser_pool_size: usize,

    /// Accept documents carrying a DOCTYPE declaration
    pub allow_doctype: bool,

    /// Parser limits
    pub limits: Limits,

    /// Additional ID-typed attributes, in Clark notation (`{ns}local` or
    /// `local`)
    pub id_attributes: Vec<String>,

    /// Allowed clock skew in seconds for time-bound checks
    pub clock_skew_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parser_pool_size: DEFAULT_POOL_SIZE,
            allow_doctype: false,
            limits: Limits::default(),
            id_attributes: Vec::new(),
            clock_skew_seconds: ValidationContext::DEFAULT_CLOCK_SKEW_SECONDS,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Parse(ParseError::new(format!("invalid configuration: {}", e))))
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Parse(
                ParseError::new(format!("invalid configuration: {}", e))
                    .with_location(path.display().to_string()),
            )
        })
    }

    /// Registry with every built-in binding plus the configured ID attributes
    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::with_defaults();
        for name in &self.id_attributes {
            registry.register_id_attribute(QName::from_clark(name)?);
        }
        debug!(extra_id_attributes = self.id_attributes.len(), "built provider registry");
        Ok(registry)
    }

    /// Parser pool honouring the configured limits and DOCTYPE policy
    pub fn build_parser_pool(&self) -> ParserPool {
        ParserPool::with_limits(self.limits.clone())
            .allow_doctype(self.allow_doctype)
            .max_pool_size(self.parser_pool_size)
    }

    /// Fresh validation context carrying the configured clock skew
    pub fn validation_context(&self) -> ValidationContext {
        ValidationContext::new().with_param(
            keys::CLOCK_SKEW,
            ParameterValue::Duration(chrono::Duration::seconds(self.clock_skew_seconds)),
        )
    }
}
