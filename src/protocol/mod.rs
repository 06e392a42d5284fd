//! Wire protocol spoken on a freshly opened peer socket.
//!
//! Packets are length-delimited frames carrying bincode encoded messages.
//! Before a connection is handed to the rest of the node both ends prove
//! possession of their identity keys, see [`verify_peer`].

pub mod messages;
pub mod verify_peer;

use tokio_util::codec::LengthDelimitedCodec;

pub use messages::Challenge;
pub use messages::VerifyMessage;
pub use verify_peer::verify_as_initiator;
pub use verify_peer::verify_as_responder;
pub use verify_peer::VerifyError;

/// Number of random bytes in a verification challenge.
pub const CHALLENGE_SIZE: usize = 64;

/// Sent with the first challenge so a responder can tell it is talking to a
/// peer of the same network before spending a signature.
pub const MAGIC_VALUE: [u8; 15] = *b"neptune-verify1";

pub(crate) fn packet_codec(max_packet_data_size: usize) -> LengthDelimitedCodec {
    let mut codec_rules = LengthDelimitedCodec::new();
    codec_rules.set_max_frame_length(max_packet_data_size);
    codec_rules
}
