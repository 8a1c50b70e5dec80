//! Algorithm identifiers for XML-DSig

use crate::error::SignatureError;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Algorithm URIs
pub mod uri {
    /// Inclusive C14N 1.0
    pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
    /// Inclusive C14N 1.0 with comments
    pub const C14N_WITH_COMMENTS: &str =
        "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
    /// Exclusive C14N 1.0
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// Exclusive C14N 1.0 with comments
    pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
    /// Enveloped signature transform
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

    /// SHA-1 digest
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    /// SHA-256 digest
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    /// SHA-384 digest
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    /// SHA-512 digest
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

    /// RSA PKCS#1 v1.5 with SHA-1
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    /// RSA PKCS#1 v1.5 with SHA-256
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    /// RSA PKCS#1 v1.5 with SHA-384
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    /// RSA PKCS#1 v1.5 with SHA-512
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

    /// HMAC-SHA1
    pub const HMAC_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#hmac-sha1";
    /// HMAC-SHA256
    pub const HMAC_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha256";
    /// HMAC-SHA384
    pub const HMAC_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha384";
    /// HMAC-SHA512
    pub const HMAC_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha512";
}

/// Hash function underlying a digest, RSA or HMAC algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunction {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashFunction {
    /// Output size in bits
    pub fn output_bits(self) -> usize {
        match self {
            Self::Sha1 => 160,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    /// Hash `data` in one shot
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

fn unsupported(kind: &str, uri: &str) -> SignatureError {
    SignatureError::UnsupportedAlgorithm(format!("{} algorithm: {}", kind, uri))
}

/// `ds:DigestMethod` algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestAlgorithm(pub HashFunction);

impl DigestAlgorithm {
    /// SHA-256, the default for new signatures
    pub const SHA256: Self = Self(HashFunction::Sha256);

    /// Resolve a digest URI
    pub fn from_uri(uri: &str) -> Result<Self, SignatureError> {
        let hash = match uri {
            uri::SHA1 => HashFunction::Sha1,
            uri::SHA256 => HashFunction::Sha256,
            uri::SHA384 => HashFunction::Sha384,
            uri::SHA512 => HashFunction::Sha512,
            _ => return Err(unsupported("digest", uri)),
        };
        Ok(Self(hash))
    }

    /// Algorithm URI
    pub fn uri(self) -> &'static str {
        match self.0 {
            HashFunction::Sha1 => uri::SHA1,
            HashFunction::Sha256 => uri::SHA256,
            HashFunction::Sha384 => uri::SHA384,
            HashFunction::Sha512 => uri::SHA512,
        }
    }

    /// Digest `data`
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        self.0.hash(data)
    }
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        Self::SHA256
    }
}

/// `ds:SignatureMethod` algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5
    Rsa(HashFunction),
    /// HMAC
    Hmac(HashFunction),
}

impl SignatureAlgorithm {
    /// Resolve a signature method URI
    pub fn from_uri(uri: &str) -> Result<Self, SignatureError> {
        Ok(match uri {
            uri::RSA_SHA1 => Self::Rsa(HashFunction::Sha1),
            uri::RSA_SHA256 => Self::Rsa(HashFunction::Sha256),
            uri::RSA_SHA384 => Self::Rsa(HashFunction::Sha384),
            uri::RSA_SHA512 => Self::Rsa(HashFunction::Sha512),
            uri::HMAC_SHA1 => Self::Hmac(HashFunction::Sha1),
            uri::HMAC_SHA256 => Self::Hmac(HashFunction::Sha256),
            uri::HMAC_SHA384 => Self::Hmac(HashFunction::Sha384),
            uri::HMAC_SHA512 => Self::Hmac(HashFunction::Sha512),
            _ => return Err(unsupported("signature", uri)),
        })
    }

    /// Algorithm URI
    pub fn uri(self) -> &'static str {
        match self {
            Self::Rsa(HashFunction::Sha1) => uri::RSA_SHA1,
            Self::Rsa(HashFunction::Sha256) => uri::RSA_SHA256,
            Self::Rsa(HashFunction::Sha384) => uri::RSA_SHA384,
            Self::Rsa(HashFunction::Sha512) => uri::RSA_SHA512,
            Self::Hmac(HashFunction::Sha1) => uri::HMAC_SHA1,
            Self::Hmac(HashFunction::Sha256) => uri::HMAC_SHA256,
            Self::Hmac(HashFunction::Sha384) => uri::HMAC_SHA384,
            Self::Hmac(HashFunction::Sha512) => uri::HMAC_SHA512,
        }
    }

    /// Underlying hash function
    pub fn hash(self) -> HashFunction {
        match self {
            Self::Rsa(h) | Self::Hmac(h) => h,
        }
    }

    /// Whether this is an HMAC algorithm
    pub fn is_hmac(self) -> bool {
        matches!(self, Self::Hmac(_))
    }

    /// Shortest `HMACOutputLength` accepted, in bits
    pub fn min_hmac_output_bits(self) -> usize {
        std::cmp::max(80, self.hash().output_bits() / 2)
    }
}

/// Canonicalization method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum C14nMethod {
    /// Inclusive C14N 1.0
    Inclusive,
    /// Inclusive C14N 1.0 with comments
    InclusiveWithComments,
    /// Exclusive C14N 1.0
    Exclusive,
    /// Exclusive C14N 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMethod {
    /// Resolve a canonicalization URI
    pub fn from_uri(uri: &str) -> Result<Self, SignatureError> {
        Ok(match uri {
            uri::C14N => Self::Inclusive,
            uri::C14N_WITH_COMMENTS => Self::InclusiveWithComments,
            uri::EXC_C14N => Self::Exclusive,
            uri::EXC_C14N_WITH_COMMENTS => Self::ExclusiveWithComments,
            _ => return Err(unsupported("canonicalization", uri)),
        })
    }

    /// Algorithm URI
    pub fn uri(self) -> &'static str {
        match self {
            Self::Inclusive => uri::C14N,
            Self::InclusiveWithComments => uri::C14N_WITH_COMMENTS,
            Self::Exclusive => uri::EXC_C14N,
            Self::ExclusiveWithComments => uri::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Exclusive variant
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    /// Comment-preserving variant
    pub fn with_comments(self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }
}

impl Default for C14nMethod {
    fn default() -> Self {
        Self::Exclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_round_trip() {
        for u in [uri::RSA_SHA256, uri::HMAC_SHA1, uri::HMAC_SHA512] {
            assert_eq!(SignatureAlgorithm::from_uri(u).unwrap().uri(), u);
        }
        for u in [uri::C14N, uri::EXC_C14N_WITH_COMMENTS] {
            assert_eq!(C14nMethod::from_uri(u).unwrap().uri(), u);
        }
        assert!(DigestAlgorithm::from_uri("http://www.w3.org/2001/04/xmldsig-more#md5").is_err());
    }

    #[test]
    fn test_hmac_minimum_output() {
        assert_eq!(SignatureAlgorithm::Hmac(HashFunction::Sha1).min_hmac_output_bits(), 80);
        assert_eq!(SignatureAlgorithm::Hmac(HashFunction::Sha256).min_hmac_output_bits(), 128);
        assert_eq!(SignatureAlgorithm::Hmac(HashFunction::Sha512).min_hmac_output_bits(), 256);
    }

    #[test]
    fn test_sha256_digest_of_empty_input() {
        let digest = DigestAlgorithm::SHA256.digest(b"");
        assert_eq!(digest.len(), 32);
        assert_eq!(digest[0], 0xe3);
        assert_eq!(digest[31], 0x55);
    }
}
