//! XML Signature support
//!
//! [`signature`] holds the object bindings and [`keyinfo`] publishes keys
//! into them. [`signer`] computes digests and signature values into a
//! marshalled signature; [`validator`] and [`profile`] verify them. Canonicalization ([`c14n`]) and reference
//! processing ([`reference`]) always operate on the DOM already in memory.

pub mod algorithm;
pub mod c14n;
pub mod credential;
pub mod crypto;
pub mod keyinfo;
pub mod profile;
pub mod reference;
pub mod signature;
pub mod signer;
pub mod validator;

pub use algorithm::{C14nMethod, DigestAlgorithm, HashFunction, SignatureAlgorithm};
pub use credential::{Credential, KeyMaterial};
pub use keyinfo::{rsa_public_key, KeyInfoGenerator};
pub use profile::SignatureProfileValidator;
pub use signature::{
    ContentReference, Exponent, KeyInfo, KeyName, KeyValue, Modulus, ReferenceTarget, RsaKeyValue, Signature,
    SignatureMarshaller, SignatureUnmarshaller, SignedInfoView, Transform,
};
pub use signer::{marshall_and_sign, sign};
pub use validator::SignatureValidator;
