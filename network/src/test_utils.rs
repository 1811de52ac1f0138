//! Scripted peers and an in-memory node stack for unit tests

use crate::error::NetworkError;
use crate::peer::Peer;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strata_core::{
    Block, BlockPersister, BlockPool, BlockProcessor, Broadcaster, ChainContext, GenesisBuilder, HeaderPersister,
    Message, PeerId, ProcessorConfig, Transaction, TransactionKind,
};
use strata_storage::{ChainRepository, MemoryStore};
use tokio::sync::mpsc;

/// Genesis followed by `len - 1` linked blocks
pub fn chain(len: usize) -> Vec<Block> {
    let mut blocks = vec![GenesisBuilder::new().build()];
    for index in 1..len as u32 {
        let parent = &blocks[blocks.len() - 1];
        let mut block = Block::new(
            index,
            parent.hash().unwrap(),
            parent.header.timestamp + 15,
            index as u64,
            vec![Transaction::new(TransactionKind::Miner { nonce: index })],
        );
        block.sign();
        blocks.push(block);
    }
    blocks.truncate(len);
    blocks
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<(Message, Option<PeerId>)>>,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<(Message, Option<PeerId>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: Message, exclude: Option<PeerId>) {
        self.sent.lock().unwrap().push((message, exclude));
    }
}

/// Peer whose inbound messages are pushed by the test
pub struct ScriptedPeer {
    id: PeerId,
    address: SocketAddr,
    connected: AtomicBool,
    ready: AtomicBool,
    sent: Mutex<Vec<Message>>,
    inbox_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl ScriptedPeer {
    pub fn new(id: PeerId) -> Arc<Self> {
        Self::with_address(id, SocketAddr::from(([127, 0, 0, 1], 30000 + id.0 as u16)))
    }

    pub fn with_address(id: PeerId, address: SocketAddr) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(ScriptedPeer {
            id,
            address,
            connected: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            inbox_tx: Mutex::new(Some(tx)),
            inbox_rx: tokio::sync::Mutex::new(rx),
        })
    }

    pub fn push(&self, message: Message) {
        if let Some(tx) = self.inbox_tx.lock().unwrap().as_ref() {
            let _ = tx.send(message);
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_blocks(&self) -> Vec<Block> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Block(block) => Some(block),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Peer for ScriptedPeer {
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
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn receive(&self) -> Result<Message, NetworkError> {
        let mut inbox = self.inbox_rx.lock().await;
        inbox.recv().await.ok_or(NetworkError::Disconnected)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.inbox_tx.lock().unwrap().take();
    }
}

/// Memory-backed chain with genesis persisted and an idle processor
pub struct Stack {
    pub context: Arc<ChainContext>,
    pub repository: Arc<ChainRepository>,
    pub processor: Arc<BlockProcessor>,
    pub genesis: Block,
    pub blocks: Vec<Block>,
}

impl Stack {
    pub async fn new() -> Self {
        Self::with_chain(1).await
    }

    pub async fn with_chain(len: usize) -> Self {
        let context = Arc::new(ChainContext::new());
        let repository = Arc::new(ChainRepository::new(Arc::new(MemoryStore::new())));
        let headers = Arc::new(HeaderPersister::new(
            repository.clone(),
            context.clone(),
            GenesisBuilder::new().hash(),
        ));
        let persister = Arc::new(BlockPersister::new(headers, repository.clone()));

        let blocks = chain(len);
        for block in &blocks {
            assert!(persister.persist(block.clone()).await.unwrap());
            context.set_current_block(Some(block.clone()));
        }

        let processor = Arc::new(BlockProcessor::new(
            Arc::new(BlockPool::new()),
            persister,
            context.clone(),
            Arc::new(RecordingBroadcaster::default()),
            ProcessorConfig::default(),
        ));

        Stack {
            context,
            repository,
            processor,
            genesis: blocks[0].clone(),
            blocks,
        }
    }
}
