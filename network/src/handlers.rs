//! Message handlers
//!
//! Each handler claims the message kinds it understands; the dispatcher hands
//! a message to the first handler that claims it. Validation failures are
//! logged and the message dropped, only transport and handshake errors are
//! returned as fatal to the peer.

use crate::error::NetworkError;
use crate::manager::PeerManager;
use crate::peer::Peer;
use crate::protocol::ServerContext;
use async_trait::async_trait;
use std::sync::Arc;
use strata_core::{
    AddBlockOutcome, BlockProcessor, Broadcaster, ChainContext, ChainError, ChainQuery, GetBlocksPayload,
    Message, Repository, TransactionKind,
};
use strata_mempool::TransactionPool;
use tracing::{debug, info};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn can_handle(&self, message: &Message) -> bool;

    async fn handle(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError>;
}

pub struct MessageDispatcher {
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl MessageDispatcher {
    pub fn new(handlers: Vec<Arc<dyn MessageHandler>>) -> Self {
        MessageDispatcher { handlers }
    }

    pub async fn dispatch(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        match self.handlers.iter().find(|h| h.can_handle(&message)) {
            Some(handler) => handler.handle(message, peer).await,
            None => {
                debug!(peer = %peer.id(), command = message.command(), "no handler for message");
                Ok(())
            }
        }
    }
}

pub struct VersionMessageHandler {
    server: Arc<ServerContext>,
    chain: Arc<ChainContext>,
}

impl VersionMessageHandler {
    pub fn new(server: Arc<ServerContext>, chain: Arc<ChainContext>) -> Self {
        VersionMessageHandler { server, chain }
    }
}

#[async_trait]
impl MessageHandler for VersionMessageHandler {
    fn can_handle(&self, message: &Message) -> bool {
        matches!(message, Message::Version(_))
    }

    async fn handle(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        let Message::Version(payload) = message else {
            return Ok(());
        };
        self.server
            .validate_version(&payload)
            .map_err(NetworkError::HandshakeFailed)?;

        debug!(
            peer = %peer.id(),
            height = payload.current_block_index,
            user_agent = %payload.user_agent,
            "version received"
        );
        self.chain.observe_peer_height(payload.current_block_index);
        peer.send(Message::VerAck).await
    }
}

pub struct VerAckMessageHandler {
    manager: Arc<PeerManager>,
}

impl VerAckMessageHandler {
    pub fn new(manager: Arc<PeerManager>) -> Self {
        VerAckMessageHandler { manager }
    }
}

#[async_trait]
impl MessageHandler for VerAckMessageHandler {
    fn can_handle(&self, message: &Message) -> bool {
        matches!(message, Message::VerAck)
    }

    async fn handle(&self, _message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        if !self.manager.mark_ready(peer.id()) {
            // Not registered with the manager; still let its loop proceed
            peer.mark_ready();
        }
        Ok(())
    }
}

pub struct BlockMessageHandler {
    processor: Arc<BlockProcessor>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl BlockMessageHandler {
    pub fn new(processor: Arc<BlockProcessor>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        BlockMessageHandler {
            processor,
            broadcaster,
        }
    }
}

#[async_trait]
impl MessageHandler for BlockMessageHandler {
    fn can_handle(&self, message: &Message) -> bool {
        matches!(message, Message::Block(_))
    }

    async fn handle(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        let Message::Block(mut block) = message else {
            return Ok(());
        };
        let hash = block.sign();

        if let Err(e) = block.validate_structure() {
            info!(peer = %peer.id(), height = block.index(), hash = %hash, error = %e, "invalid block dropped");
            return Ok(());
        }

        match self.processor.add_block(block.clone()) {
            Ok(AddBlockOutcome::Queued) => {
                debug!(peer = %peer.id(), height = block.index(), hash = %hash, "block queued");
                self.broadcaster.broadcast(Message::Block(block), Some(peer.id()));
                Ok(())
            }
            Ok(outcome) => {
                debug!(height = block.index(), hash = %hash, ?outcome, "block ignored");
                Ok(())
            }
            Err(ChainError::AlreadyQueued(_)) => {
                debug!(height = block.index(), hash = %hash, "block already queued");
                Ok(())
            }
            Err(ChainError::PoolFull(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct TransactionMessageHandler {
    pool: Arc<TransactionPool>,
    chain: Arc<dyn ChainQuery>,
}

impl TransactionMessageHandler {
    pub fn new(pool: Arc<TransactionPool>, chain: Arc<dyn ChainQuery>) -> Self {
        TransactionMessageHandler { pool, chain }
    }
}

#[async_trait]
impl MessageHandler for TransactionMessageHandler {
    fn can_handle(&self, message: &Message) -> bool {
        matches!(message, Message::Transaction(_))
    }

    async fn handle(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        let Message::Transaction(mut tx) = message else {
            return Ok(());
        };
        // Miner transactions only travel inside blocks
        if matches!(tx.kind, TransactionKind::Miner { .. }) {
            return Ok(());
        }

        let hash = tx.sign();
        if self.chain.contains_transaction(&hash).map_err(ChainError::from)? {
            info!(hash = %hash, "transaction already on chain");
            return Ok(());
        }

        if self.pool.add(tx).await? {
            debug!(peer = %peer.id(), hash = %hash, "transaction queued for admission");
        }
        Ok(())
    }
}

pub struct GetBlocksMessageHandler {
    repository: Arc<dyn Repository>,
    max_blocks: u32,
}

impl GetBlocksMessageHandler {
    pub fn new(repository: Arc<dyn Repository>, max_blocks: u32) -> Self {
        GetBlocksMessageHandler { repository, max_blocks }
    }

    fn first_height(&self, payload: &GetBlocksPayload) -> Result<Option<u32>, ChainError> {
        match payload.start() {
            None => Ok(Some(0)),
            Some(hash) => Ok(self.repository.block_height_by_hash(&hash)?.map(|h| h + 1)),
        }
    }
}

#[async_trait]
impl MessageHandler for GetBlocksMessageHandler {
    fn can_handle(&self, message: &Message) -> bool {
        matches!(message, Message::GetBlocks(_))
    }

    async fn handle(&self, message: Message, peer: &Arc<dyn Peer>) -> Result<(), NetworkError> {
        let Message::GetBlocks(payload) = message else {
            return Ok(());
        };
        let Some(first) = self.first_height(&payload)? else {
            debug!(peer = %peer.id(), "getblocks from unknown start");
            return Ok(());
        };

        let stop = payload.stop();
        let mut sent = 0u32;
        let mut height = first;
        while sent < self.max_blocks {
            let Some(block) = self.repository.block(height).map_err(ChainError::from)? else {
                break;
            };
            let hash = block.hash();
            peer.send(Message::Block(block)).await?;
            sent += 1;
            if hash.is_some() && hash == stop {
                break;
            }
            height += 1;
        }

        debug!(peer = %peer.id(), from = first, sent, "answered getblocks");
        Ok(())
    }
}
