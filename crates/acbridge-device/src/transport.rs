//! Sockets between the bridge and the device.
//!
//! Discovery runs over a broadcast UDP socket; status requests and commands
//! share one TCP connection. Both are opened lazily on first send. Reader
//! tasks only split bytes into frames and forward them, in arrival order, on a
//! single channel; all decoding happens in the caller's loop.

use crate::error::TransportError;
use crate::stream::StatusFrameDecoder;
use bytes::Bytes;
use futures::StreamExt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

/// Capacity of the inbound frame channel.
const INBOUND_CAPACITY: usize = 64;

/// Largest datagram accepted from the discovery socket.
const MAX_DATAGRAM: usize = 512;

/// Bytes received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One UDP datagram
    Datagram {
        /// Datagram contents
        bytes: Bytes,
        /// Sender
        from: SocketAddr,
    },
    /// One frame split from the status connection
    Frame {
        /// Frame bytes
        bytes: Bytes,
        /// Connection peer
        from: SocketAddr,
    },
}

impl Inbound {
    /// Received bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Datagram { bytes, .. } | Self::Frame { bytes, .. } => bytes,
        }
    }

    /// Sender address.
    #[must_use]
    pub fn sender(&self) -> SocketAddr {
        match self {
            Self::Datagram { from, .. } | Self::Frame { from, .. } => *from,
        }
    }
}

/// Outgoing side of the device link.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one datagram to `target` (usually the broadcast address).
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound or the send fails.
    async fn send_datagram(
        &mut self,
        bytes: &[u8],
        target: SocketAddr,
    ) -> Result<(), TransportError>;

    /// Write `bytes` on the status connection to `peer`, connecting first if
    /// there is no live connection to it.
    ///
    /// # Errors
    ///
    /// Returns error if connecting or writing fails.
    async fn send_over_connection(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
    ) -> Result<(), TransportError>;

    /// Drop the status connection, if any.
    fn disconnect(&mut self);
}

struct Connection {
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn is_usable_for(&self, peer: SocketAddr) -> bool {
        self.peer == peer && !self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// [`Transport`] over tokio sockets.
pub struct TokioTransport {
    inbound: mpsc::Sender<Inbound>,
    udp: Option<Arc<UdpSocket>>,
    connection: Option<Connection>,
}

impl TokioTransport {
    /// Create a transport and the receiver for everything it reads.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let transport = Self {
            inbound: tx,
            udp: None,
            connection: None,
        };
        (transport, rx)
    }

    async fn udp_socket(&mut self) -> Result<Arc<UdpSocket>, TransportError> {
        if let Some(socket) = &self.udp {
            return Ok(Arc::clone(socket));
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        let socket = Arc::new(socket);
        if let Ok(local) = socket.local_addr() {
            tracing::debug!(%local, "Discovery socket bound");
        }

        tokio::spawn(read_datagrams(Arc::clone(&socket), self.inbound.clone()));
        self.udp = Some(Arc::clone(&socket));
        Ok(socket)
    }

    async fn connect(&self, peer: SocketAddr) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|e| TransportError::Connect {
                peer,
                reason: e.to_string(),
            })?;
        let (read, writer) = stream.into_split();

        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_frames(
            read,
            peer,
            self.inbound.clone(),
            Arc::clone(&closed),
        ));

        tracing::info!(%peer, "Status connection established");
        Ok(Connection {
            peer,
            writer,
            closed,
            reader,
        })
    }
}

impl Transport for TokioTransport {
    async fn send_datagram(
        &mut self,
        bytes: &[u8],
        target: SocketAddr,
    ) -> Result<(), TransportError> {
        let socket = self.udp_socket().await?;
        socket
            .send_to(bytes, target)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        tracing::debug!(%target, len = bytes.len(), "Datagram sent");
        Ok(())
    }

    async fn send_over_connection(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
    ) -> Result<(), TransportError> {
        let mut connection = match self.connection.take() {
            Some(existing) if existing.is_usable_for(peer) => existing,
            stale => {
                if stale.is_some() {
                    tracing::debug!(%peer, "Replacing stale status connection");
                }
                drop(stale);
                self.connect(peer).await?
            }
        };

        match connection.writer.write_all(bytes).await {
            Ok(()) => {
                tracing::debug!(%peer, len = bytes.len(), "Frame written");
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Status connection write failed");
                Err(TransportError::Send(e.to_string()))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::info!(peer = %connection.peer, "Status connection dropped");
        }
    }
}

async fn read_datagrams(socket: Arc<UdpSocket>, tx: mpsc::Sender<Inbound>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let inbound = Inbound::Datagram {
                    bytes: Bytes::copy_from_slice(&buf[..len]),
                    from,
                };
                if tx.send(inbound).await.is_err() {
                    tracing::debug!("Inbound receiver dropped, stopping datagram reader");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Datagram receive failed");
            }
        }
    }
}

async fn read_frames(
    read: OwnedReadHalf,
    peer: SocketAddr,
    tx: mpsc::Sender<Inbound>,
    closed: Arc<AtomicBool>,
) {
    let mut frames = FramedRead::new(read, StatusFrameDecoder::new());
    while let Some(result) = frames.next().await {
        match result {
            Ok(bytes) => {
                if tx.send(Inbound::Frame { bytes, from: peer }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Status connection read failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    tracing::debug!(%peer, "Status connection reader finished");
}
