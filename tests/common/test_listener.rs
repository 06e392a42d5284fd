use std::time::Duration;

use neptune_connector::connection::PeerSocket;
use neptune_connector::peer::NodeEndpoint;
use neptune_connector::protocol::verify_as_responder;
use neptune_connector::protocol::Challenge;
use neptune_connector::protocol::VerifyMessage;
use neptune_connector::KeyPair;
use neptune_connector::PeerIdentity;
use neptune_connector::PeerNode;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// How a [`TestListener`] treats the connections it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer the verification exchange, then keep the connection open
    /// until the dialer closes it.
    Verify,

    /// Answer the verification exchange, then close.
    VerifyThenHangUp,

    /// Prove its own key, then refuse the dialer's counter-signature and
    /// close without acknowledging.
    RejectDialer,

    /// Read whatever arrives, never answer.
    Silent,

    /// Close right after accepting.
    HangUp,
}

/// What a [`TestListener`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Accepted,
    PacketReceived,
    Verified(PeerIdentity),
    Rejected(PeerIdentity),
    Disconnected,
}

/// Loopback node that dialers can be pointed at.
#[derive(Debug)]
pub struct TestListener {
    pub key_pair: KeyPair,
    pub node: PeerNode,
    events: mpsc::UnboundedReceiver<ListenerEvent>,
    task: JoinHandle<()>,
}

impl TestListener {
    pub async fn spawn(behavior: Behavior) -> Self {
        Self::spawn_with_key(KeyPair::generate(), behavior).await
    }

    pub async fn spawn_with_key(key_pair: KeyPair, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let node = PeerNode::new(
            key_pair.identity(),
            NodeEndpoint::from(listener.local_addr().unwrap()),
        )
        .with_name(format!("{behavior:?}"));
        let (sender, events) = mpsc::unbounded_channel();

        let task = {
            let key_pair = key_pair.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let _ = sender.send(ListenerEvent::Accepted);
                    let socket = PeerSocket::from_tcp(stream, MAX_PACKET_SIZE);
                    tokio::spawn(serve(socket, key_pair.clone(), behavior, sender.clone()));
                }
            })
        };

        Self {
            key_pair,
            node,
            events,
            task,
        }
    }

    /// Wait for the next event, giving up after `limit`.
    pub async fn next_event(&mut self, limit: Duration) -> Option<ListenerEvent> {
        tokio::time::timeout(limit, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until `expected` is observed, skipping other events.
    pub async fn expect_event(&mut self, expected: ListenerEvent, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_event(remaining).await {
                Some(event) if event == expected => return true,
                Some(_) => {}
                None => return false,
            }
        }
    }

    /// Events observed so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<ListenerEvent> {
        let mut events = vec![];
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for TestListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: PeerSocket,
    key_pair: KeyPair,
    behavior: Behavior,
    events: mpsc::UnboundedSender<ListenerEvent>,
) {
    match behavior {
        Behavior::Verify | Behavior::VerifyThenHangUp => {
            if let Ok(identity) = verify_as_responder(&socket, &key_pair).await {
                let _ = events.send(ListenerEvent::Verified(identity));
                if behavior == Behavior::VerifyThenHangUp {
                    socket.close();
                    return;
                }
            }
        }
        Behavior::RejectDialer => {
            if let Some(identity) = answer_then_reject(&socket, &key_pair).await {
                let _ = events.send(ListenerEvent::Rejected(identity));
            }
            socket.close();
            return;
        }
        Behavior::Silent => {
            if socket.read_packet().await.is_ok() {
                let _ = events.send(ListenerEvent::PacketReceived);
            }
        }
        Behavior::HangUp => {
            socket.close();
            return;
        }
    }

    while socket.read_packet().await.is_ok() {}
    let _ = events.send(ListenerEvent::Disconnected);
}

/// Run the responder side up to the counter-challenge response without
/// checking or acknowledging it.
async fn answer_then_reject(socket: &PeerSocket, key_pair: &KeyPair) -> Option<PeerIdentity> {
    let Ok(VerifyMessage::ChallengeRequest { challenge, .. }) = socket.receive().await else {
        return None;
    };
    socket
        .send(&VerifyMessage::ChallengeResponse {
            identity: key_pair.identity(),
            signature: key_pair.sign(challenge.as_bytes()),
            counter_challenge: Challenge::random(),
        })
        .await
        .ok()?;
    match socket.receive().await {
        Ok(VerifyMessage::CounterChallengeResponse { identity, .. }) => Some(identity),
        _ => None,
    }
}
