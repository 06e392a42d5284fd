//! Framed, closeable byte stream to a remote node.
//!
//! A [`PeerSocket`] is a cheap cloneable handle. Every clone refers to the
//! same stream, so closing any of them closes it for all holders. Pending
//! reads and writes observe the close and return [`SocketError::Closed`].

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use bytes::BytesMut;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_serde::formats::SymmetricalBincode;
use tokio_serde::Deserializer;
use tokio_serde::Serializer;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::codec::LengthDelimitedCodec;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::packet_codec;

/// Anything a [`PeerSocket`] can run over.
pub trait PeerTransport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> PeerTransport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedTransport = Box<dyn PeerTransport>;
type PacketReader = FramedRead<ReadHalf<BoxedTransport>, LengthDelimitedCodec>;
type PacketWriter = FramedWrite<WriteHalf<BoxedTransport>, LengthDelimitedCodec>;

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket is closed")]
    Closed,

    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Malformed(std::io::Error),
}

/// Process-unique socket number, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

struct SocketInner {
    id: SocketId,
    remote: String,

    // halves are dropped on close; the stream itself goes away with the last one
    reader: Mutex<Option<PacketReader>>,
    writer: Mutex<Option<PacketWriter>>,

    closed: CancellationToken,
}

impl SocketInner {
    /// Drop whichever halves are free once the socket is closed. Every
    /// holder of a half calls this after letting go of it, so the last one
    /// out releases the stream.
    fn release_halves_if_closed(&self) {
        if !self.closed.is_cancelled() {
            return;
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

/// Runs [`SocketInner::release_halves_if_closed`] when dropped. Declared
/// before a half's lock guard, it runs after that guard is gone, also when
/// the operation holding it is cancelled.
struct ReleaseOnClose<'a>(&'a SocketInner);

impl Drop for ReleaseOnClose<'_> {
    fn drop(&mut self) {
        self.0.release_halves_if_closed();
    }
}

#[derive(Clone)]
pub struct PeerSocket {
    inner: Arc<SocketInner>,
}

impl PeerSocket {
    /// Wrap a raw stream. `remote` labels the socket in log output.
    pub fn new<T: PeerTransport>(
        transport: T,
        remote: impl Into<String>,
        max_packet_data_size: usize,
    ) -> Self {
        let transport: BoxedTransport = Box::new(transport);
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            inner: Arc::new(SocketInner {
                id: SocketId::next(),
                remote: remote.into(),
                reader: Mutex::new(Some(FramedRead::new(
                    read_half,
                    packet_codec(max_packet_data_size),
                ))),
                writer: Mutex::new(Some(FramedWrite::new(
                    write_half,
                    packet_codec(max_packet_data_size),
                ))),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn from_tcp(stream: TcpStream, max_packet_data_size: usize) -> Self {
        let remote = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        Self::new(stream, remote, max_packet_data_size)
    }

    pub fn id(&self) -> SocketId {
        self.inner.id
    }

    pub fn remote(&self) -> &str {
        &self.inner.remote
    }

    pub fn is_open(&self) -> bool {
        !self.inner.closed.is_cancelled()
    }

    /// Close the stream. Idempotent.
    ///
    /// Halves not currently in use are dropped immediately. A half held by an
    /// in-progress read or write is dropped when that operation lets go of
    /// it, whether it completes, fails or is cancelled.
    pub fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        debug!("Closing {} to {}", self.inner.id, self.inner.remote);
        self.inner.closed.cancel();
        self.inner.release_halves_if_closed();
    }

    /// Resolves once the socket has been closed, locally or because the
    /// remote end went away.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Returns true if `other` is a handle to the same stream.
    pub fn same_socket(&self, other: &PeerSocket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the next packet. End of stream closes the socket.
    pub async fn read_packet(&self) -> Result<Bytes, SocketError> {
        let _release = ReleaseOnClose(&self.inner);
        let mut guard = tokio::select! {
            biased;
            () = self.inner.closed.cancelled() => return Err(SocketError::Closed),
            guard = self.inner.reader.lock() => guard,
        };
        let Some(reader) = guard.as_mut() else {
            return Err(SocketError::Closed);
        };

        let frame = tokio::select! {
            biased;
            () = self.inner.closed.cancelled() => None,
            frame = reader.next() => Some(frame),
        };

        match frame {
            Some(Some(Ok(packet))) => Ok(packet.freeze()),
            Some(Some(Err(e))) => {
                debug!("Read from {} failed: {e}", self.inner.remote);
                guard.take();
                self.close();
                Err(SocketError::Io(e))
            }
            Some(None) => {
                debug!("{} closed by {}", self.inner.id, self.inner.remote);
                guard.take();
                self.close();
                Err(SocketError::Closed)
            }
            None => {
                guard.take();
                Err(SocketError::Closed)
            }
        }
    }

    pub async fn write_packet(&self, packet: Bytes) -> Result<(), SocketError> {
        let _release = ReleaseOnClose(&self.inner);
        let mut guard = tokio::select! {
            biased;
            () = self.inner.closed.cancelled() => return Err(SocketError::Closed),
            guard = self.inner.writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Err(SocketError::Closed);
        };

        let sent = tokio::select! {
            biased;
            () = self.inner.closed.cancelled() => None,
            sent = writer.send(packet) => Some(sent),
        };

        match sent {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                debug!("Write to {} failed: {e}", self.inner.remote);
                guard.take();
                self.close();
                Err(SocketError::Io(e))
            }
            None => {
                guard.take();
                Err(SocketError::Closed)
            }
        }
    }

    /// Serialize `message` with bincode and send it as one packet.
    pub async fn send<M>(&self, message: &M) -> Result<(), SocketError>
    where
        M: Serialize + DeserializeOwned + Unpin,
    {
        let mut codec = SymmetricalBincode::<M>::default();
        let packet = Pin::new(&mut codec)
            .serialize(message)
            .map_err(SocketError::Malformed)?;
        self.write_packet(packet).await
    }

    /// Receive one packet and decode it as `M`. A packet that fails to decode
    /// leaves the socket open.
    pub async fn receive<M>(&self) -> Result<M, SocketError>
    where
        M: Serialize + DeserializeOwned + Unpin,
    {
        let packet = self.read_packet().await?;
        let mut codec = SymmetricalBincode::<M>::default();
        Pin::new(&mut codec)
            .deserialize(&BytesMut::from(&packet[..]))
            .map_err(SocketError::Malformed)
    }
}

impl fmt::Debug for PeerSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSocket")
            .field("id", &self.inner.id)
            .field("remote", &self.inner.remote)
            .field("open", &self.is_open())
            .finish()
    }
}
