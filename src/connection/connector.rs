//! Public entry point for opening verified connections to other nodes.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::attempt::AttemptContext;
use super::attempt::ConnectionAttempt;
use super::attempt::Resolution;
use super::lock;
use super::ActiveConnectionRegistry;
use super::AttemptControl;
use super::AttemptId;
use super::AttemptObserver;
use super::AttemptStage;
use super::ConnectResult;
use super::ConnectionInfo;
use super::PeerSocket;
use super::TimeoutGuard;
use super::TracingObserver;
use crate::config::ConnectionSettings;
use crate::peer::KeyPair;
use crate::peer::PeerIdentity;
use crate::peer::PeerNode;

/// Bookkeeping for an attempt whose outcome is not yet known.
#[derive(Debug)]
struct PendingAttempt {
    identity: PeerIdentity,
    control: Arc<AttemptControl>,
    guard: TimeoutGuard,
}

#[derive(Debug, Default)]
struct PendingAttempts {
    closed: bool,
    attempts: HashMap<AttemptId, PendingAttempt>,
}

impl PendingAttempts {
    fn contains_identity(&self, identity: &PeerIdentity) -> bool {
        self.attempts
            .values()
            .any(|attempt| attempt.identity == *identity)
    }
}

#[derive(Debug)]
struct ConnectorState {
    executor: Handle,
    key_pair: KeyPair,
    settings: ConnectionSettings,
    observer: Arc<dyn AttemptObserver>,

    registry: Arc<ActiveConnectionRegistry>,
    pending: Mutex<PendingAttempts>,
    outstanding: Option<Semaphore>,
    next_attempt_id: AtomicU64,
}

/// Opens outbound connections, verifies them and tracks the ones that
/// succeed.
///
/// Cloning yields another handle to the same connector.
#[derive(Clone)]
pub struct ServerConnector {
    state: Arc<ConnectorState>,
}

impl fmt::Debug for ServerConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnector")
            .field("identity", &self.state.key_pair.identity())
            .field("active", &self.num_active_connections())
            .field("pending", &self.num_pending_attempts())
            .finish_non_exhaustive()
    }
}

impl ServerConnector {
    /// Attempts and their callbacks run on `executor`. The caller owns the
    /// runtime behind it and is responsible for shutting it down.
    pub fn create(executor: Handle, key_pair: KeyPair, settings: ConnectionSettings) -> Self {
        Self::with_observer(executor, key_pair, settings, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        executor: Handle,
        key_pair: KeyPair,
        settings: ConnectionSettings,
        observer: Arc<dyn AttemptObserver>,
    ) -> Self {
        let outstanding = settings.max_outstanding_connections.map(Semaphore::new);
        Self {
            state: Arc::new(ConnectorState {
                executor,
                key_pair,
                settings,
                observer,
                registry: Arc::new(ActiveConnectionRegistry::new()),
                pending: Mutex::new(PendingAttempts::default()),
                outstanding,
                next_attempt_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn identity(&self) -> PeerIdentity {
        self.state.key_pair.identity()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.state.settings
    }

    /// Start connecting to `node` and return immediately.
    ///
    /// `callback` runs exactly once on the executor. It receives the
    /// verified socket when the result is [`ConnectResult::Accepted`], in
    /// which case the connection is already counted as active. The socket
    /// stays tracked until either side closes it or the connector shuts
    /// down.
    pub fn connect<F>(&self, node: PeerNode, callback: F)
    where
        F: FnOnce(ConnectResult, Option<PeerSocket>) + Send + 'static,
    {
        let state = &self.state;
        let id = AttemptId(state.next_attempt_id.fetch_add(1, Ordering::Relaxed));
        let control = Arc::new(AttemptControl::new());
        state
            .observer
            .on_transition(id, &node, AttemptStage::Initiating);

        let (rejection, guard) = {
            let mut pending = lock(&state.pending);
            if pending.closed {
                (Some(ConnectResult::SocketError), None)
            } else if !state.settings.allow_duplicate_connections
                && (pending.contains_identity(&node.identity)
                    || state.registry.contains_identity(&node.identity))
            {
                (Some(ConnectResult::AlreadyConnected), None)
            } else {
                let guard = {
                    let control = control.clone();
                    TimeoutGuard::arm(&state.executor, state.settings.timeout, move || {
                        control.resolve(ConnectResult::TimedOut);
                    })
                };
                pending.attempts.insert(
                    id,
                    PendingAttempt {
                        identity: node.identity,
                        control: control.clone(),
                        guard: guard.clone(),
                    },
                );
                (None, Some(guard))
            }
        };

        if let Some(result) = rejection {
            debug!("Rejecting connection to {node}: {result}");
            control.resolve(result);
        }

        let attempt = ConnectionAttempt::new(id, node, control, guard);
        state
            .executor
            .spawn(run_attempt(self.state.clone(), attempt, callback));
    }

    /// Like [`connect`](Self::connect), but waits for the result.
    pub async fn connect_and_wait(&self, node: PeerNode) -> (ConnectResult, Option<PeerSocket>) {
        let (sender, receiver) = oneshot::channel();
        self.connect(node, move |result, socket| {
            let _ = sender.send((result, socket));
        });

        // the attempt task is only dropped without answering if the
        // executor itself is shutting down
        receiver.await.unwrap_or((ConnectResult::SocketError, None))
    }

    /// Number of verified connections currently open.
    pub fn num_active_connections(&self) -> usize {
        self.state.registry.count()
    }

    /// Number of attempts still connecting or verifying.
    pub fn num_pending_attempts(&self) -> usize {
        lock(&self.state.pending).attempts.len()
    }

    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.state.registry.connections()
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.state.pending).closed
    }

    /// Stop the connector. Idempotent.
    ///
    /// Every pending attempt resolves as [`ConnectResult::SocketError`]
    /// unless it already resolved, every active connection is closed, and
    /// later `connect` calls fail. Does not wait for attempt tasks to
    /// finish; their callbacks still run on the executor.
    pub fn shutdown(&self) {
        let state = &self.state;
        let drained: Vec<_> = {
            let mut pending = lock(&state.pending);
            if !pending.closed {
                info!("Shutting down connector");
            }
            pending.closed = true;
            pending.attempts.drain().collect()
        };

        for (id, attempt) in drained {
            attempt.guard.cancel();
            if attempt.control.resolve(ConnectResult::SocketError) {
                debug!("Aborted {id} on shutdown");
            }
        }

        if let Some(outstanding) = &state.outstanding {
            outstanding.close();
        }

        state.registry.close_all();
    }
}

async fn run_attempt<F>(state: Arc<ConnectorState>, attempt: ConnectionAttempt, callback: F)
where
    F: FnOnce(ConnectResult, Option<PeerSocket>) + Send + 'static,
{
    let resolution = attempt
        .run(AttemptContext {
            key_pair: &state.key_pair,
            settings: &state.settings,
            outstanding: state.outstanding.as_ref(),
            observer: state.observer.as_ref(),
        })
        .await;

    let (result, socket) = match resolution {
        Resolution::Accepted { identity, socket } => {
            match state
                .registry
                .insert(identity, attempt.node.endpoint.clone(), socket.clone())
            {
                Ok(handle) => {
                    // the entry goes away once the socket closes, whoever closes it
                    let registry = state.registry.clone();
                    let watched = socket.clone();
                    state.executor.spawn(async move {
                        watched.closed().await;
                        registry.remove(handle);
                    });
                    (ConnectResult::Accepted, Some(socket))
                }
                Err(e) => {
                    debug!("Dropping {} to {}: {e}", attempt.id, attempt.node);
                    (ConnectResult::SocketError, None)
                }
            }
        }
        Resolution::Failed(result) => (result, None),
    };

    lock(&state.pending).attempts.remove(&attempt.id);

    let stage = match result {
        ConnectResult::Accepted => AttemptStage::Accepted,
        failure => AttemptStage::Failed(failure),
    };
    state.observer.on_transition(attempt.id, &attempt.node, stage);

    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(result, socket))).is_err() {
        error!("Connect callback for {} panicked", attempt.node);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use assert2::assert;
    use assert2::let_assert;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    use super::*;
    use crate::peer::NodeEndpoint;
    use crate::protocol::verify_as_responder;
    use crate::tests::shared::TEST_MAX_PACKET_SIZE;

    /// Listener that verifies one dialer and reports once the dialer's end
    /// of the stream goes away.
    async fn verify_then_await_disconnect(
        key_pair: KeyPair,
    ) -> (PeerNode, oneshot::Receiver<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let node = PeerNode::new(
            key_pair.identity(),
            NodeEndpoint::from(listener.local_addr().unwrap()),
        );
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = PeerSocket::from_tcp(stream, TEST_MAX_PACKET_SIZE);
            let verified = verify_as_responder(&socket, &key_pair).await.is_ok();
            while socket.read_packet().await.is_ok() {}
            let _ = sender.send(verified);
        });
        (node, receiver)
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread")]
    async fn accepted_attempt_finding_registry_closed_is_socket_error() {
        let (node, disconnected) = verify_then_await_disconnect(KeyPair::generate()).await;
        let connector = ServerConnector::create(
            Handle::current(),
            KeyPair::generate(),
            ConnectionSettings::default(),
        );

        // a shutdown that has closed the registry while this attempt was
        // still verifying
        connector.state.registry.close_all();
        let (result, socket) = connector.connect_and_wait(node).await;

        assert!(result == ConnectResult::SocketError);
        assert!(socket.is_none());
        let_assert!(Ok(Ok(true)) = tokio::time::timeout(Duration::from_secs(5), disconnected).await);
        assert!(connector.num_active_connections() == 0);
        assert!(connector.num_pending_attempts() == 0);
    }

    #[tokio::test]
    async fn shutdown_resolves_pending_attempt_before_its_work_runs() {
        let (node, _disconnected) = verify_then_await_disconnect(KeyPair::generate()).await;
        let connector = ServerConnector::create(
            Handle::current(),
            KeyPair::generate(),
            ConnectionSettings::default(),
        );

        // current-thread runtime: the attempt task cannot start before
        // shutdown claims its outcome
        let (sender, receiver) = oneshot::channel();
        connector.connect(node, move |result, socket| {
            let _ = sender.send((result, socket.is_some()));
        });
        assert!(connector.num_pending_attempts() == 1);
        connector.shutdown();

        let_assert!(Ok((ConnectResult::SocketError, false)) = receiver.await);
        assert!(connector.num_pending_attempts() == 0);
        assert!(connector.num_active_connections() == 0);
    }
}
