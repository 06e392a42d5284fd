use std::fmt;

use ed25519_dalek::Signature;
use rand::Rng;
use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use super::CHALLENGE_SIZE;
use crate::peer::PeerIdentity;

/// Random bytes a peer must sign to prove it holds its identity key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_SIZE]);

impl Challenge {
    pub fn random() -> Self {
        let mut bytes = [0u8; CHALLENGE_SIZE];
        rand::rng().fill(&mut bytes[..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_SIZE] {
        &self.0
    }
}

impl From<[u8; CHALLENGE_SIZE]> for Challenge {
    fn from(bytes: [u8; CHALLENGE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({}..)", hex::encode(&self.0[..8]))
    }
}

// serde only derives for arrays up to 32 elements
impl Serialize for Challenge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0[..].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Challenge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let len = bytes.len();
        let bytes: [u8; CHALLENGE_SIZE] = bytes
            .try_into()
            .map_err(|_| de::Error::invalid_length(len, &"64 challenge bytes"))?;
        Ok(Self(bytes))
    }
}

/// Messages exchanged while verifying a freshly opened connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum VerifyMessage {
    /// Initiator to responder.
    ChallengeRequest {
        magic_value: [u8; 15],
        challenge: Challenge,
    },

    /// Responder to initiator: proof of the responder's key, plus a
    /// challenge for the initiator.
    ChallengeResponse {
        identity: PeerIdentity,
        signature: Signature,
        counter_challenge: Challenge,
    },

    /// Initiator to responder: proof of the initiator's key.
    CounterChallengeResponse {
        identity: PeerIdentity,
        signature: Signature,
    },

    /// Responder to initiator: the counter-challenge checked out.
    Verified,
}
