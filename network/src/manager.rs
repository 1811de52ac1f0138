//! Connected peer set

use crate::peer::Peer;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{Broadcaster, ChainContext, Message, PeerId};
use tracing::{debug, info, warn};

pub struct PeerManager {
    peers: DashMap<PeerId, Arc<dyn Peer>>,
    context: Arc<ChainContext>,
    next_id: AtomicU64,
}

impl PeerManager {
    pub fn new(context: Arc<ChainContext>) -> Self {
        PeerManager {
            peers: DashMap::new(),
            context,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_peer_id(&self) -> PeerId {
        PeerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add(&self, peer: Arc<dyn Peer>) {
        debug!(peer = %peer.id(), address = %peer.address(), "peer added");
        self.peers.insert(peer.id(), peer);
    }

    pub fn remove(&self, id: PeerId) -> Option<Arc<dyn Peer>> {
        let removed = self.peers.remove(&id).map(|(_, peer)| peer);
        if removed.is_some() {
            debug!(peer = %id, "peer removed");
            self.refresh_connected();
        }
        removed
    }

    /// Handshake finished for `id`
    pub fn mark_ready(&self, id: PeerId) -> bool {
        let Some(peer) = self.get(id) else {
            return false;
        };
        peer.mark_ready();
        self.context.set_peer_connected(true);
        info!(peer = %id, address = %peer.address(), "peer ready");
        true
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<dyn Peer>> {
        self.peers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn ready_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.peers
            .iter()
            .filter(|entry| entry.value().is_ready() && entry.value().is_connected())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub async fn disconnect_all(&self) {
        let peers: Vec<Arc<dyn Peer>> = self.peers.iter().map(|entry| entry.value().clone()).collect();
        self.peers.clear();
        for peer in peers {
            peer.disconnect().await;
        }
        self.context.set_peer_connected(false);
    }

    fn refresh_connected(&self) {
        let any_ready = self.peers.iter().any(|entry| entry.value().is_ready());
        self.context.set_peer_connected(any_ready);
    }
}

impl Broadcaster for PeerManager {
    fn broadcast(&self, message: Message, exclude: Option<PeerId>) {
        let targets: Vec<Arc<dyn Peer>> = self
            .ready_peers()
            .into_iter()
            .filter(|peer| Some(peer.id()) != exclude)
            .collect();
        debug!(command = message.command(), peers = targets.len(), "broadcasting");

        for peer in targets {
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = peer.send(message).await {
                    warn!(peer = %peer.id(), error = %e, "broadcast send failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedPeer;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_tracking_drives_peer_connected() {
        let context = Arc::new(ChainContext::new());
        let manager = PeerManager::new(context.clone());

        let peer = ScriptedPeer::new(manager.next_peer_id());
        manager.add(peer.clone());
        assert!(!context.is_peer_connected());

        assert!(manager.mark_ready(peer.id()));
        assert!(context.is_peer_connected());
        assert_eq!(manager.ready_peers().len(), 1);

        manager.remove(peer.id());
        assert!(!context.is_peer_connected());
        assert!(!manager.mark_ready(peer.id()));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender_and_unready_peers() {
        let manager = PeerManager::new(Arc::new(ChainContext::new()));
        let sender = ScriptedPeer::new(manager.next_peer_id());
        let ready = ScriptedPeer::new(manager.next_peer_id());
        let pending = ScriptedPeer::new(manager.next_peer_id());
        for peer in [&sender, &ready, &pending] {
            manager.add(peer.clone());
        }
        manager.mark_ready(sender.id());
        manager.mark_ready(ready.id());

        manager.broadcast(Message::VerAck, Some(sender.id()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(sender.sent().is_empty());
        assert_eq!(ready.sent(), vec![Message::VerAck]);
        assert!(pending.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_all() {
        let context = Arc::new(ChainContext::new());
        let manager = PeerManager::new(context.clone());
        let peer = ScriptedPeer::new(manager.next_peer_id());
        manager.add(peer.clone());
        manager.mark_ready(peer.id());

        manager.disconnect_all().await;
        assert!(manager.is_empty());
        assert!(!peer.is_connected());
        assert!(!context.is_peer_connected());
    }
}
