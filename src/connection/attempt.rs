//! One outbound connection attempt: connect, then verify.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::AttemptControl;
use super::AttemptId;
use super::AttemptObserver;
use super::AttemptStage;
use super::ConnectResult;
use super::PeerSocket;
use super::TimeoutGuard;
use crate::config::ConnectionSettings;
use crate::peer::KeyPair;
use crate::peer::PeerIdentity;
use crate::peer::PeerNode;
use crate::protocol::verify_as_initiator;

/// How an attempt ended.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// This attempt claimed `Accepted`; the caller now owns the socket.
    Accepted {
        identity: PeerIdentity,
        socket: PeerSocket,
    },
    Failed(ConnectResult),
}

type WorkResult = std::thread::Result<Result<(PeerIdentity, PeerSocket), ConnectResult>>;

/// Everything an attempt needs from its connector while it runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptContext<'a> {
    pub key_pair: &'a KeyPair,
    pub settings: &'a ConnectionSettings,
    pub outstanding: Option<&'a Semaphore>,
    pub observer: &'a dyn AttemptObserver,
}

#[derive(Debug)]
pub(crate) struct ConnectionAttempt {
    pub id: AttemptId,
    pub node: PeerNode,
    control: Arc<AttemptControl>,
    guard: Option<TimeoutGuard>,
}

impl ConnectionAttempt {
    pub fn new(
        id: AttemptId,
        node: PeerNode,
        control: Arc<AttemptControl>,
        guard: Option<TimeoutGuard>,
    ) -> Self {
        Self {
            id,
            node,
            control,
            guard,
        }
    }

    /// Drive the attempt until some party claims its outcome.
    ///
    /// Connecting and verifying race against the outcome slot: if the
    /// deadline or a shutdown claims it first, the in-progress work is
    /// dropped, closing any socket it opened.
    pub async fn run(&self, context: AttemptContext<'_>) -> Resolution {
        let work = AssertUnwindSafe(self.connect_and_verify(context)).catch_unwind();

        tokio::select! {
            biased;
            () = self.control.resolved() => {
                debug!("{} to {} resolved elsewhere", self.id, self.node);
                self.cancel_guard();
                self.decided_failure()
            }
            result = work => self.settle(result),
        }
    }

    /// Try to claim the outcome with what the work produced. A verified
    /// socket that loses the claim is closed.
    fn settle(&self, result: WorkResult) -> Resolution {
        match result {
            Ok(Ok((identity, socket))) => {
                if self.control.resolve(ConnectResult::Accepted) {
                    self.cancel_guard();
                    return Resolution::Accepted { identity, socket };
                }
                debug!("{} to {} verified too late, closing", self.id, self.node);
                socket.close();
            }
            Ok(Err(failure)) => {
                self.control.resolve(failure);
            }
            Err(_panic) => {
                error!("{} to {} panicked", self.id, self.node);
                self.control.resolve(ConnectResult::SocketError);
            }
        }

        self.cancel_guard();
        self.decided_failure()
    }

    fn decided_failure(&self) -> Resolution {
        Resolution::Failed(
            self.control
                .outcome()
                .unwrap_or(ConnectResult::SocketError),
        )
    }

    fn cancel_guard(&self) {
        if let Some(guard) = &self.guard {
            guard.cancel();
        }
    }

    async fn connect_and_verify(
        &self,
        context: AttemptContext<'_>,
    ) -> Result<(PeerIdentity, PeerSocket), ConnectResult> {
        let endpoint = &self.node.endpoint;
        context
            .observer
            .on_transition(self.id, &self.node, AttemptStage::Connecting);

        let _permit = match context.outstanding {
            Some(semaphore) => Some(
                semaphore
                    .acquire()
                    .await
                    .map_err(|_| ConnectResult::SocketError)?,
            ),
            None => None,
        };

        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| {
                debug!("Failed to connect to {}: {e}", endpoint);
                ConnectResult::SocketError
            })?;
        if let Err(e) = stream.set_nodelay(context.settings.tcp_nodelay) {
            debug!("Could not set TCP_NODELAY for {}: {e}", endpoint);
        }
        let socket = PeerSocket::from_tcp(stream, context.settings.max_packet_data_size);

        context
            .observer
            .on_transition(self.id, &self.node, AttemptStage::Verifying);
        match verify_as_initiator(&socket, context.key_pair, Some(&self.node.identity)).await {
            Ok(identity) => Ok((identity, socket)),
            Err(e) => {
                warn!("Failed to verify {}: {e}", self.node);
                socket.close();
                Err(ConnectResult::VerifyError)
            }
        }
    }
}
