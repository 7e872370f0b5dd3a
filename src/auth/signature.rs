//! HMAC signing and verification.

use std::fmt;

use ring::hmac;

use super::canonical::{self, CanonicalMode};
use crate::config::{HeaderNames, Policy};

/// Supported HMAC digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Parse an algorithm name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of a hex-encoded tag.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            Self::Sha256 => hmac::HMAC_SHA256,
            Self::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an HMAC key for the given algorithm.
pub fn signing_key(algorithm: Algorithm, secret: &[u8]) -> hmac::Key {
    hmac::Key::new(algorithm.hmac_algorithm(), secret)
}

/// Check that a client signature has the exact hex shape for the algorithm.
pub fn is_well_formed(signature: &str, algorithm: Algorithm) -> bool {
    signature.len() == algorithm.hex_len() && signature.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compute the lowercase hex tag of `message`.
pub fn sign(key: &hmac::Key, message: &[u8]) -> String {
    hex::encode(hmac::sign(key, message).as_ref())
}

/// Verify a hex tag against `message`.
///
/// The provided hex is lowercased before decoding; the tag comparison itself
/// is constant-time.
pub fn verify(key: &hmac::Key, message: &[u8], provided_hex: &str) -> bool {
    let normalized = provided_hex.to_ascii_lowercase();
    let tag = match hex::decode(normalized) {
        Ok(tag) => tag,
        Err(_) => return false,
    };
    hmac::verify(key, message, &tag).is_ok()
}

/// Header values a client attaches to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
}

/// Client-side request signer.
///
/// Produces exactly what the gate verifies, so senders and tests share one
/// implementation of the wire contract.
pub struct Signer {
    key: hmac::Key,
    mode: CanonicalMode,
    headers: HeaderNames,
}

impl Signer {
    /// Create a signer for a secret and algorithm.
    pub fn new(secret: &[u8], algorithm: Algorithm, mode: CanonicalMode) -> Self {
        Self {
            key: signing_key(algorithm, secret),
            mode,
            headers: HeaderNames::default(),
        }
    }

    /// Create a signer matching a configured policy.
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            key: signing_key(policy.algorithm(), policy.secret()),
            mode: policy.canonical_mode(),
            headers: policy.headers().clone(),
        }
    }

    /// Sign a request.
    pub fn sign(
        &self,
        timestamp: i64,
        nonce: &str,
        body: &[u8],
        method: &str,
        target: &str,
    ) -> SignedHeaders {
        let message = canonical::build(self.mode, timestamp, nonce, body, method, target);
        SignedHeaders {
            signature: sign(&self.key, &message),
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
        }
    }

    /// Header name/value pairs for a signed request.
    pub fn header_pairs(&self, signed: &SignedHeaders) -> Vec<(String, String)> {
        vec![
            (self.headers.signature.clone(), signed.signature.clone()),
            (self.headers.timestamp.clone(), signed.timestamp.clone()),
            (self.headers.nonce.clone(), signed.nonce.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(Algorithm::parse("sha256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::parse(" SHA512 "), Some(Algorithm::Sha512));
        assert_eq!(Algorithm::parse("md5"), None);
        assert_eq!(Algorithm::parse(""), None);
    }

    #[test]
    fn test_known_vector_sha256() {
        // RFC 4231 test case 2
        let key = signing_key(Algorithm::Sha256, b"Jefe");
        assert_eq!(
            sign(&key, b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_known_vector_sha512() {
        // RFC 4231 test case 2
        let key = signing_key(Algorithm::Sha512, b"Jefe");
        let tag = sign(&key, b"what do ya want for nothing?");
        assert_eq!(tag.len(), 128);
        assert!(tag.starts_with("164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd6"));
    }

    #[test]
    fn test_verify_case_insensitive() {
        let key = signing_key(Algorithm::Sha256, b"secret");
        let tag = sign(&key, b"message");
        assert!(verify(&key, b"message", &tag));
        assert!(verify(&key, b"message", &tag.to_ascii_uppercase()));
        assert!(!verify(&key, b"other", &tag));
    }

    #[test]
    fn test_verify_rejects_non_hex() {
        let key = signing_key(Algorithm::Sha256, b"secret");
        assert!(!verify(&key, b"message", "zz"));
        assert!(!verify(&key, b"message", ""));
    }

    #[test]
    fn test_well_formed() {
        let sha256 = "a".repeat(64);
        assert!(is_well_formed(&sha256, Algorithm::Sha256));
        assert!(is_well_formed(&"AbCdEf0123456789".repeat(4), Algorithm::Sha256));
        assert!(!is_well_formed(&sha256, Algorithm::Sha512));
        assert!(!is_well_formed(&"g".repeat(64), Algorithm::Sha256));
        assert!(!is_well_formed(&"a".repeat(63), Algorithm::Sha256));
        assert!(is_well_formed(&"0".repeat(128), Algorithm::Sha512));
    }

    #[test]
    fn test_signer_matches_manual_computation() {
        let signer = Signer::new(b"k", Algorithm::Sha256, CanonicalMode::Simple);
        let signed = signer.sign(100, "n1", b"body", "POST", "/");
        let key = signing_key(Algorithm::Sha256, b"k");
        assert!(verify(&key, b"100.n1.body", &signed.signature));
        assert_eq!(signed.timestamp, "100");
        assert_eq!(signed.nonce, "n1");

        let pairs = signer.header_pairs(&signed);
        assert_eq!(pairs[0].0, "X-Signature");
        assert_eq!(pairs[1], ("X-Timestamp".to_string(), "100".to_string()));
    }
}
