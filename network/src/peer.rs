//! Peer transport
//!
//! `Peer` is the seam between the server loop and the socket. `TcpPeer` is
//! the production transport; tests drive the server with scripted peers.

use crate::codec::FrameCodec;
use crate::error::NetworkError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::{Message, PeerId};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[async_trait]
pub trait Peer: Send + Sync {
    fn id(&self) -> PeerId;

    fn address(&self) -> SocketAddr;

    fn is_connected(&self) -> bool;

    /// Handshake completed
    fn is_ready(&self) -> bool;

    fn mark_ready(&self);

    async fn send(&self, message: Message) -> Result<(), NetworkError>;

    /// Suspends until a message arrives or the connection drops
    async fn receive(&self) -> Result<Message, NetworkError>;

    async fn disconnect(&self);
}

pub struct TcpPeer {
    id: PeerId,
    address: SocketAddr,
    codec: FrameCodec,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    connected: AtomicBool,
    ready: AtomicBool,
}

impl TcpPeer {
    pub fn new(id: PeerId, stream: TcpStream, address: SocketAddr, codec: FrameCodec) -> Self {
        // Nagle only delays small handshake frames
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        TcpPeer {
            id,
            address,
            codec,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub async fn connect(id: PeerId, address: SocketAddr, codec: FrameCodec) -> Result<Self, NetworkError> {
        let stream = TcpStream::connect(address).await?;
        debug!(peer = %id, %address, "connected to peer");
        Ok(Self::new(id, stream, address, codec))
    }
}

#[async_trait]
impl Peer for TcpPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    async fn send(&self, message: Message) -> Result<(), NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::Disconnected);
        }
        let mut writer = self.writer.lock().await;
        let result = self.codec.write(&mut *writer, &message).await;
        if result.is_err() {
            self.connected.store(false, Ordering::Release);
        }
        result
    }

    async fn receive(&self) -> Result<Message, NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::Disconnected);
        }
        let mut reader = self.reader.lock().await;
        let result = self.codec.read(&mut *reader).await;
        if matches!(result, Err(ref e) if e.is_fatal_to_peer()) {
            self.connected.store(false, Ordering::Release);
        }
        result
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
            debug!(peer = %self.id, address = %self.address, "peer disconnected");
        }
    }
}

pub struct PeerListener {
    listener: TcpListener,
}

impl PeerListener {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!(address = %listener.local_addr()?, "listening for peers");
        Ok(PeerListener { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), NetworkError> {
        Ok(self.listener.accept().await?)
    }
}
