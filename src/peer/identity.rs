//! Node identity keys.
//!
//! A node proves who it is by signing challenges with its ed25519 secret
//! key. Remote nodes know it by the matching public key, its
//! [`PeerIdentity`].

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use ed25519_dalek::SECRET_KEY_LENGTH;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("expected {expected} key bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("bytes do not encode a valid public key")]
    InvalidPublicKey,

    #[error("signature does not match identity {0}")]
    BadSignature(PeerIdentity),
}

/// Public key of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerIdentity([u8; PUBLIC_KEY_LENGTH]);

impl PeerIdentity {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Result<Self, IdentityError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Check that `signature` was produced over `data` by the holder of this
    /// identity's secret key.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> Result<(), IdentityError> {
        // bytes arriving off the wire were never checked for curve validity
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| IdentityError::InvalidPublicKey)?;
        key.verify(data, signature)
            .map_err(|_| IdentityError::BadSignature(*self))
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({})", self.short())
    }
}

impl FromStr for PeerIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let actual = bytes.len();
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual,
            })?;
        Self::from_bytes(bytes)
    }
}

/// Secret signing key of the local node.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Fresh key pair from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let secret: [u8; SECRET_KEY_LENGTH] = rand::random();
        Self::from_secret_bytes(&secret)
    }

    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Parse a hex encoded 32-byte secret key.
    pub fn from_secret_hex(secret: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(secret.trim())?;
        let actual = bytes.len();
        let secret_bytes: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::InvalidLength {
                expected: SECRET_KEY_LENGTH,
                actual,
            })?;
        Ok(Self::from_secret_bytes(&secret_bytes))
    }

    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        self.signing_key.sign(data)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use assert2::assert;
    use assert2::let_assert;

    use super::*;

    #[test]
    fn signature_verifies_against_own_identity() {
        let key_pair = KeyPair::generate();
        let signature = key_pair.sign(b"challenge");
        assert!(key_pair.identity().verify(b"challenge", &signature).is_ok());
    }

    #[test]
    fn signature_does_not_verify_against_other_identity() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = signer.sign(b"challenge");

        let_assert!(
            Err(IdentityError::BadSignature(identity)) =
                other.identity().verify(b"challenge", &signature)
        );
        assert!(identity == other.identity());
    }

    #[test]
    fn signature_does_not_verify_for_other_data() {
        let key_pair = KeyPair::generate();
        let signature = key_pair.sign(b"challenge");
        assert!(key_pair.identity().verify(b"other", &signature).is_err());
    }

    #[test]
    fn identity_hex_round_trip() {
        let identity = KeyPair::generate().identity();
        let parsed: PeerIdentity = identity.to_string().parse().unwrap();
        assert!(parsed == identity);
    }

    #[test]
    fn identity_parse_rejects_wrong_length() {
        let_assert!(
            Err(IdentityError::InvalidLength {
                expected: 32,
                actual: 3
            }) = "abcdef".parse::<PeerIdentity>()
        );
    }

    #[test]
    fn identity_parse_rejects_non_hex() {
        let_assert!(Err(IdentityError::InvalidHex(_)) = "xyz".parse::<PeerIdentity>());
    }

    #[test]
    fn secret_hex_gives_stable_identity() {
        let secret = "11".repeat(32);
        let a = KeyPair::from_secret_hex(&secret).unwrap();
        let b = KeyPair::from_secret_hex(&secret).unwrap();
        assert!(a.identity() == b.identity());
    }

    #[test]
    fn debug_output_hides_secret() {
        let secret = "42".repeat(32);
        let key_pair = KeyPair::from_secret_hex(&secret).unwrap();
        let debug = format!("{:?}", key_pair);
        assert!(!debug.contains(&secret));
    }
}
