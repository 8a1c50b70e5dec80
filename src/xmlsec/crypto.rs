//! Signature value computation and verification over canonical SignedInfo
//! bytes

use super::algorithm::{HashFunction, SignatureAlgorithm};
use super::credential::Credential;
use crate::error::SignatureError;
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

macro_rules! rsa_sign {
    ($h:ty, $key:expr, $data:expr) => {{
        let signing_key = SigningKey::<$h>::new($key.clone());
        signing_key
            .try_sign($data)
            .map(|s| s.to_vec())
            .map_err(|e| SignatureError::Crypto(format!("RSA signing failed: {}", e)))
    }};
}

macro_rules! rsa_verify {
    ($h:ty, $key:expr, $data:expr, $sig:expr) => {{
        let verifying_key = VerifyingKey::<$h>::new($key);
        verifying_key
            .verify($data, $sig)
            .map_err(|e| SignatureError::SignatureInvalid(format!("RSA verification failed: {}", e)))
    }};
}

macro_rules! hmac_compute {
    ($h:ty, $key:expr, $data:expr) => {{
        let mut mac = <Hmac<$h> as Mac>::new_from_slice($key)
            .map_err(|e| SignatureError::Key(format!("invalid HMAC key: {}", e)))?;
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

fn hmac(hash: HashFunction, key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignatureError> {
    Ok(match hash {
        HashFunction::Sha1 => hmac_compute!(Sha1, key, data),
        HashFunction::Sha256 => hmac_compute!(Sha256, key, data),
        HashFunction::Sha384 => hmac_compute!(Sha384, key, data),
        HashFunction::Sha512 => hmac_compute!(Sha512, key, data),
    })
}

/// Number of MAC bytes to keep, checking `HMACOutputLength` against the
/// algorithm minimum
fn hmac_output_bytes(algorithm: SignatureAlgorithm, output_bits: Option<usize>) -> Result<usize, SignatureError> {
    let full = algorithm.hash().output_bits();
    let Some(bits) = output_bits else {
        return Ok(full / 8);
    };
    let minimum = algorithm.min_hmac_output_bits();
    if bits < minimum {
        return Err(SignatureError::SignatureInvalid(format!(
            "HMACOutputLength {} is below the minimum of {} bits",
            bits, minimum
        )));
    }
    if bits > full || bits % 8 != 0 {
        return Err(SignatureError::SignatureInvalid(format!(
            "unsupported HMACOutputLength {}",
            bits
        )));
    }
    Ok(bits / 8)
}

/// Compute a signature value
pub fn sign_bytes(
    algorithm: SignatureAlgorithm,
    hmac_output_bits: Option<usize>,
    credential: &Credential,
    data: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    match algorithm {
        SignatureAlgorithm::Hmac(hash) => {
            let key = credential
                .hmac_secret()
                .ok_or_else(|| SignatureError::Key("HMAC signing requires a shared secret".to_string()))?;
            let keep = hmac_output_bytes(algorithm, hmac_output_bits)?;
            let mut mac = hmac(hash, key, data)?;
            mac.truncate(keep);
            Ok(mac)
        }
        SignatureAlgorithm::Rsa(hash) => {
            let key = credential
                .rsa_private_key()
                .ok_or_else(|| SignatureError::Key("RSA signing requires a private key".to_string()))?;
            match hash {
                HashFunction::Sha1 => rsa_sign!(Sha1, key, data),
                HashFunction::Sha256 => rsa_sign!(Sha256, key, data),
                HashFunction::Sha384 => rsa_sign!(Sha384, key, data),
                HashFunction::Sha512 => rsa_sign!(Sha512, key, data),
            }
        }
    }
}

/// Verify a signature value; any failure is an error
pub fn verify_bytes(
    algorithm: SignatureAlgorithm,
    hmac_output_bits: Option<usize>,
    credential: &Credential,
    data: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    match algorithm {
        SignatureAlgorithm::Hmac(hash) => {
            let key = credential
                .hmac_secret()
                .ok_or_else(|| SignatureError::Key("HMAC verification requires a shared secret".to_string()))?;
            let keep = hmac_output_bytes(algorithm, hmac_output_bits)?;
            let mut expected = hmac(hash, key, data)?;
            expected.truncate(keep);
            if signature.len() != expected.len() || !constant_time_eq(&expected, signature) {
                return Err(SignatureError::SignatureInvalid("HMAC value does not match".to_string()));
            }
            Ok(())
        }
        SignatureAlgorithm::Rsa(hash) => {
            let key = credential
                .rsa_public_key()
                .ok_or_else(|| SignatureError::Key("RSA verification requires an RSA key".to_string()))?;
            let sig = RsaSignature::try_from(signature)
                .map_err(|e| SignatureError::SignatureInvalid(format!("malformed RSA signature: {}", e)))?;
            match hash {
                HashFunction::Sha1 => rsa_verify!(Sha1, key, data, &sig),
                HashFunction::Sha256 => rsa_verify!(Sha256, key, data, &sig),
                HashFunction::Sha384 => rsa_verify!(Sha384, key, data, &sig),
                HashFunction::Sha512 => rsa_verify!(Sha512, key, data, &sig),
            }
        }
    }
}

/// Compare two byte strings without an early exit
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_round_trip_and_tamper() {
        let credential = Credential::hmac(b"secret".to_vec());
        let algorithm = SignatureAlgorithm::Hmac(HashFunction::Sha256);
        let sig = sign_bytes(algorithm, None, &credential, b"payload").unwrap();
        assert_eq!(sig.len(), 32);
        verify_bytes(algorithm, None, &credential, b"payload", &sig).unwrap();
        assert!(verify_bytes(algorithm, None, &credential, b"payloaD", &sig).is_err());
        assert!(verify_bytes(algorithm, None, &Credential::hmac(b"other".to_vec()), b"payload", &sig).is_err());
    }

    #[test]
    fn test_hmac_truncation_limits() {
        let credential = Credential::hmac(b"secret".to_vec());
        let algorithm = SignatureAlgorithm::Hmac(HashFunction::Sha256);
        let truncated = sign_bytes(algorithm, Some(128), &credential, b"x").unwrap();
        assert_eq!(truncated.len(), 16);
        verify_bytes(algorithm, Some(128), &credential, b"x", &truncated).unwrap();

        let err = verify_bytes(algorithm, Some(64), &credential, b"x", &truncated[..8]).unwrap_err();
        assert!(matches!(err, SignatureError::SignatureInvalid(_)));
        assert!(verify_bytes(algorithm, None, &credential, b"x", &truncated).is_err());
    }

    #[test]
    fn test_key_kind_must_match_algorithm() {
        let credential = Credential::hmac(b"secret".to_vec());
        let err = sign_bytes(SignatureAlgorithm::Rsa(HashFunction::Sha256), None, &credential, b"x").unwrap_err();
        assert!(matches!(err, SignatureError::Key(_)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
