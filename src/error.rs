//! Error types for samlkit
//!
//! This module defines the error taxonomy shared by the whole crate:
//! marshalling, unmarshalling, validation and signature failures all surface
//! through [`Error`], each with a message and, where available, a root cause.

use std::fmt;
use thiserror::Error;

/// Result type alias using the samlkit [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed root cause carried by the structured errors below
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for samlkit operations
#[derive(Error, Debug)]
pub enum Error {
    /// An object tree could not be serialized into DOM
    #[error("marshalling error: {0}")]
    Marshalling(#[from] MarshallingError),

    /// A DOM tree could not be turned into an object tree
    #[error("unmarshalling error: {0}")]
    Unmarshalling(#[from] UnmarshallingError),

    /// A validator could not interpret its input
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Signature creation or verification failed
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// XML parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Namespace error (unbound prefix, bad declaration)
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Invalid structural operation on an object tree
    #[error("structure error: {0}")]
    Structure(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! cause_carrying_error {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            /// Error message
            pub message: String,
            source: Option<Cause>,
        }

        impl $name {
            /// Create a new error with the given message
            pub fn new(message: impl Into<String>) -> Self {
                Self {
                    message: message.into(),
                    source: None,
                }
            }

            /// Attach the underlying cause
            pub fn with_source(mut self, source: impl Into<Cause>) -> Self {
                self.source = Some(source.into());
                self
            }

            /// Whether a root cause was recorded
            pub fn has_source(&self) -> bool {
                self.source.is_some()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.message)?;
                if let Some(ref source) = self.source {
                    write!(f, ": {}", source)?;
                }
                Ok(())
            }
        }

        impl std::error::Error for $name {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                self.source
                    .as_ref()
                    .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    };
}

cause_carrying_error!(
    /// Raised when serialization cannot proceed (no registered marshaller,
    /// DOM construction failure). Never retried.
    MarshallingError
);

cause_carrying_error!(
    /// Raised when deserialization cannot proceed (no registered
    /// unmarshaller, malformed attribute value, fault during the walk).
    UnmarshallingError
);

cause_carrying_error!(
    /// Raised by a validator that could not interpret its input at all, as
    /// opposed to a policy rejection which is returned as a result.
    ValidationError
);

impl From<Error> for UnmarshallingError {
    fn from(err: Error) -> Self {
        match err {
            Error::Unmarshalling(e) => e,
            other => UnmarshallingError::new("fatal error unmarshalling XML object").with_source(other),
        }
    }
}

impl From<Error> for MarshallingError {
    fn from(err: Error) -> Self {
        match err {
            Error::Marshalling(e) => e,
            other => MarshallingError::new("fatal error marshalling XML object").with_source(other),
        }
    }
}

impl From<Error> for ValidationError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => e,
            other => ValidationError::new("unable to evaluate validation input").with_source(other),
        }
    }
}

/// XML parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Byte offset in the input, when known
    pub location: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, " (at {})", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Errors produced while computing or verifying an XML signature.
///
/// Every variant is terminal for the operation: verification never degrades
/// into "no signature".
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The Signature object has no DOM to operate on
    #[error("signature has not been marshalled: {0}")]
    NotMarshalled(String),

    /// A required element is absent from the signature structure
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// A required attribute is absent from the signature structure
    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    /// Algorithm URI not supported
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A Reference could not be resolved to exactly one element
    #[error("invalid reference: {0}")]
    Reference(String),

    /// Recomputed digest differs from the embedded DigestValue
    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    /// The SignatureValue does not verify under the supplied key
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Key material unusable for the requested algorithm
    #[error("key error: {0}")]
    Key(String),

    /// Failure inside a cryptographic primitive
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// DigestValue or SignatureValue is not valid base64
    #[error("base64 decode error: {0}")]
    Base64(String),

    /// Canonicalization could not be performed
    #[error("canonicalization error: {0}")]
    Canonicalization(String),
}
