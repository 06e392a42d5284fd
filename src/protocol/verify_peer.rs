//! Mutual challenge-response verification.
//!
//! ```text
//! initiator                                   responder
//!     | -- ChallengeRequest(magic, c1) ----------> |
//!     | <- ChallengeResponse(id_r, sig(c1), c2) -- |
//!     | -- CounterChallengeResponse(id_i, sig(c2)) |
//!     | <- Verified ------------------------------ |
//! ```
//!
//! The initiator checks the responder's signature and, if it knows whom it
//! dialed, that the responder's identity is the expected one. The responder
//! learns the initiator's identity from the counter-challenge response and
//! acknowledges it with `Verified`, so both roles succeed only when both
//! signatures checked out. Neither side
//! applies a deadline or closes the socket; both are up to the caller.

use tracing::debug;

use super::messages::Challenge;
use super::messages::VerifyMessage;
use super::MAGIC_VALUE;
use crate::connection::socket::SocketError;
use crate::connection::PeerSocket;
use crate::peer::IdentityError;
use crate::peer::KeyPair;
use crate::peer::PeerIdentity;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("connection closed during verification")]
    ConnectionClosed,

    #[error("socket failure during verification: {0}")]
    Socket(SocketError),

    #[error("expected {expected}, received {received}")]
    UnexpectedMessage {
        expected: &'static str,
        received: String,
    },

    #[error("peer sent wrong magic value")]
    BadMagicValue,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("peer identified as {actual}, expected {expected}")]
    IdentityMismatch {
        expected: PeerIdentity,
        actual: PeerIdentity,
    },
}

impl From<SocketError> for VerifyError {
    fn from(error: SocketError) -> Self {
        match error {
            SocketError::Closed => Self::ConnectionClosed,
            other => Self::Socket(other),
        }
    }
}

fn unexpected(expected: &'static str, received: &VerifyMessage) -> VerifyError {
    VerifyError::UnexpectedMessage {
        expected,
        received: received.to_string(),
    }
}

/// Verify the node at the other end of a socket this node opened.
///
/// Returns the remote identity once it has proven possession of its key and
/// has accepted this node's answer to the counter-challenge.
pub async fn verify_as_initiator(
    socket: &PeerSocket,
    key_pair: &KeyPair,
    expected_identity: Option<&PeerIdentity>,
) -> Result<PeerIdentity, VerifyError> {
    let challenge = Challenge::random();
    socket
        .send(&VerifyMessage::ChallengeRequest {
            magic_value: MAGIC_VALUE,
            challenge,
        })
        .await?;

    let (identity, signature, counter_challenge) = match socket.receive().await? {
        VerifyMessage::ChallengeResponse {
            identity,
            signature,
            counter_challenge,
        } => (identity, signature, counter_challenge),
        other => return Err(unexpected("ChallengeResponse", &other)),
    };

    identity.verify(challenge.as_bytes(), &signature)?;
    if let Some(&expected) = expected_identity {
        if expected != identity {
            return Err(VerifyError::IdentityMismatch {
                expected,
                actual: identity,
            });
        }
    }

    socket
        .send(&VerifyMessage::CounterChallengeResponse {
            identity: key_pair.identity(),
            signature: key_pair.sign(counter_challenge.as_bytes()),
        })
        .await?;

    match socket.receive().await? {
        VerifyMessage::Verified => {}
        other => return Err(unexpected("Verified", &other)),
    }

    debug!("Verified {} as {}", socket.remote(), identity.short());
    Ok(identity)
}

/// Verify the node at the other end of a socket this node accepted.
pub async fn verify_as_responder(
    socket: &PeerSocket,
    key_pair: &KeyPair,
) -> Result<PeerIdentity, VerifyError> {
    let challenge = match socket.receive().await? {
        VerifyMessage::ChallengeRequest {
            magic_value,
            challenge,
        } => {
            if magic_value != MAGIC_VALUE {
                return Err(VerifyError::BadMagicValue);
            }
            challenge
        }
        other => return Err(unexpected("ChallengeRequest", &other)),
    };

    let counter_challenge = Challenge::random();
    socket
        .send(&VerifyMessage::ChallengeResponse {
            identity: key_pair.identity(),
            signature: key_pair.sign(challenge.as_bytes()),
            counter_challenge,
        })
        .await?;

    let identity = match socket.receive().await? {
        VerifyMessage::CounterChallengeResponse {
            identity,
            signature,
        } => {
            identity.verify(counter_challenge.as_bytes(), &signature)?;
            identity
        }
        other => return Err(unexpected("CounterChallengeResponse", &other)),
    };
    socket.send(&VerifyMessage::Verified).await?;

    debug!("Verified {} as {}", socket.remote(), identity.short());
    Ok(identity)
}
