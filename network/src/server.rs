//! Peer server
//!
//! Accepts inbound connections, dials seeds, and runs one receive loop per
//! peer. Every loop and background wait hangs off the server's cancellation
//! token so `stop` tears the whole layer down.

use crate::acl::NetworkAcl;
use crate::codec::FrameCodec;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::handlers::MessageDispatcher;
use crate::manager::PeerManager;
use crate::peer::{Peer, PeerListener, TcpPeer};
use crate::protocol::ServerContext;
use futures::future::join_all;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Block, Message, PeerId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected { peer: PeerId, address: SocketAddr },
    Disconnected { peer: PeerId, address: SocketAddr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopped,
    Disposed,
}

impl ServerState {
    fn name(self) -> &'static str {
        match self {
            ServerState::Created => "not started",
            ServerState::Running => "already running",
            ServerState::Stopped => "stopped",
            ServerState::Disposed => "disposed",
        }
    }
}

pub struct Server {
    config: NetworkConfig,
    codec: FrameCodec,
    acl: NetworkAcl,
    manager: Arc<PeerManager>,
    dispatcher: Arc<MessageDispatcher>,
    context: Arc<ServerContext>,
    state: Mutex<ServerState>,
    /// Cancels the accept loop, dials and peer loops
    cancel: CancellationToken,
    /// Cancels event subscriptions; only `dispose` fires it
    subscriptions_cancel: CancellationToken,
    events: broadcast::Sender<PeerEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    pub fn new(
        config: NetworkConfig,
        manager: Arc<PeerManager>,
        dispatcher: Arc<MessageDispatcher>,
        context: Arc<ServerContext>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Server {
            codec: FrameCodec::new(config.magic, config.max_frame_bytes),
            acl: NetworkAcl::new(&config.acl),
            config,
            manager,
            dispatcher,
            context,
            state: Mutex::new(ServerState::Created),
            cancel: CancellationToken::new(),
            subscriptions_cancel: CancellationToken::new(),
            events,
            tasks: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn manager(&self) -> &Arc<PeerManager> {
        &self.manager
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Refresh the advertised height from processed blocks until disposed
    pub fn follow_processed_blocks(&self, processed: broadcast::Receiver<Block>) {
        let handle = self
            .context
            .track_height(processed, self.subscriptions_cancel.child_token());
        self.subscriptions.lock().push(handle);
    }

    /// Bind the listener, start accepting and dial the configured seeds
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, NetworkError> {
        {
            let mut state = self.state.lock();
            if *state != ServerState::Created {
                return Err(NetworkError::InvalidState(state.name()));
            }
            *state = ServerState::Running;
        }

        let listener = match PeerListener::bind(self.config.listen).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.lock() = ServerState::Created;
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;

        let server = self.clone();
        self.track(tokio::spawn(async move { server.accept_loop(listener).await }));

        if !self.config.seeds.is_empty() {
            let server = self.clone();
            let seeds = self.config.seeds.clone();
            self.track(tokio::spawn(async move {
                join_all(seeds.into_iter().map(|seed| server.dial(seed))).await;
            }));
        }

        info!(address = %local_addr, seeds = self.config.seeds.len(), "server started");
        Ok(local_addr)
    }

    /// Connect to `address` and run it like any other peer
    pub async fn dial(self: &Arc<Self>, address: SocketAddr) {
        let id = self.manager.next_peer_id();
        let connect = TcpPeer::connect(id, address, self.codec);
        let peer = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = connect => match result {
                Ok(peer) => peer,
                Err(e) => {
                    warn!(%address, error = %e, "failed to dial peer");
                    return;
                }
            },
        };
        if let Err(e) = self.attach_peer(Arc::new(peer)).await {
            warn!(%address, error = %e, "dialed peer rejected");
        }
    }

    /// Admit a connected peer: access check, Version, then its receive loop
    pub async fn attach_peer(self: &Arc<Self>, peer: Arc<dyn Peer>) -> Result<(), NetworkError> {
        if self.state() != ServerState::Running {
            peer.disconnect().await;
            return Err(NetworkError::InvalidState(self.state().name()));
        }

        let address = peer.address();
        if !self.acl.is_allowed(&address.ip()) {
            peer.disconnect().await;
            return Err(NetworkError::AccessDenied(address));
        }

        self.manager.add(peer.clone());
        let _ = self.events.send(PeerEvent::Connected { peer: peer.id(), address });

        if let Err(e) = peer.send(Message::Version(self.context.version_payload())).await {
            self.release(&peer).await;
            return Err(e);
        }

        let server = self.clone();
        self.track(tokio::spawn(async move { server.receive_loop(peer).await }));
        Ok(())
    }

    /// Disconnect every peer and cancel every loop
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Stopped | ServerState::Disposed => return,
                _ => *state = ServerState::Stopped,
            }
        }

        self.cancel.cancel();
        self.manager.disconnect_all().await;

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("server stopped");
    }

    /// `stop`, then drop every event subscription
    pub async fn dispose(&self) {
        if self.state() == ServerState::Disposed {
            return;
        }
        self.stop().await;
        *self.state.lock() = ServerState::Disposed;

        self.subscriptions_cancel.cancel();
        let subscriptions: Vec<JoinHandle<()>> = self.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            let _ = subscription.await;
        }
        debug!("server disposed");
    }

    async fn accept_loop(self: Arc<Self>, listener: PeerListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, address)) => {
                    let peer = TcpPeer::new(self.manager.next_peer_id(), stream, address, self.codec);
                    debug!(peer = %peer.id(), %address, "inbound connection");
                    if let Err(e) = self.attach_peer(Arc::new(peer)).await {
                        warn!(%address, error = %e, "inbound peer rejected");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }
    }

    async fn receive_loop(self: Arc<Self>, peer: Arc<dyn Peer>) {
        let interval = self.config.receive_interval();
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = peer.receive() => received,
            };

            match received {
                // Before the handshake only handshake messages count, after it they are noise
                Ok(message) if peer.is_ready() == message.is_handshake() => {
                    debug!(peer = %peer.id(), command = message.command(), "message skipped");
                }
                Ok(message) => {
                    let command = message.command();
                    if let Err(e) = self.dispatcher.dispatch(message, &peer).await {
                        if e.is_fatal_to_peer() {
                            warn!(peer = %peer.id(), command, error = %e, "dropping peer");
                            break;
                        }
                        warn!(peer = %peer.id(), command, error = %e, "message handling failed");
                    }
                }
                Err(e) if e.is_fatal_to_peer() => {
                    debug!(peer = %peer.id(), error = %e, "peer connection closed");
                    break;
                }
                Err(e) => warn!(peer = %peer.id(), error = %e, "receive failed"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.release(&peer).await;
    }

    async fn release(&self, peer: &Arc<dyn Peer>) {
        peer.disconnect().await;
        if self.manager.remove(peer.id()).is_some() {
            let _ = self.events.send(PeerEvent::Disconnected {
                peer: peer.id(),
                address: peer.address(),
            });
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}
