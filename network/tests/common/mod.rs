//! In-process nodes wired over real TCP on loopback

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    Block, BlockPersister, BlockPool, BlockProcessor, ChainContext, GenesisBuilder, HeaderPersister,
    ProcessorConfig, Transaction, TransactionKind,
};
use strata_mempool::TransactionPool;
use strata_network::{
    BlockMessageHandler, GetBlocksMessageHandler, MessageDispatcher, MessageHandler, NetworkConfig, PeerManager,
    Server, ServerContext, TransactionMessageHandler, VerAckMessageHandler, VersionMessageHandler,
};
use strata_storage::{ChainRepository, MemoryStore};

/// Genesis followed by `len - 1` linked blocks
pub fn chain(len: usize) -> Vec<Block> {
    let mut blocks = vec![GenesisBuilder::new().build()];
    while blocks.len() < len {
        let next = next_block(&blocks[blocks.len() - 1]);
        blocks.push(next);
    }
    blocks
}

pub fn next_block(parent: &Block) -> Block {
    let index = parent.index() + 1;
    let mut block = Block::new(
        index,
        parent.hash().unwrap(),
        parent.header.timestamp + 15,
        index as u64,
        vec![Transaction::new(TransactionKind::Miner { nonce: index })],
    );
    block.sign();
    block
}

pub struct TestNode {
    pub context: Arc<ChainContext>,
    pub processor: Arc<BlockProcessor>,
    pub server: Arc<Server>,
    pub transactions: Arc<TransactionPool>,
    pub address: SocketAddr,
}

impl TestNode {
    /// Persist `blocks`, then start the processor and the server
    pub async fn start(blocks: &[Block], seeds: Vec<SocketAddr>) -> TestNode {
        let context = Arc::new(ChainContext::new());
        let repository = Arc::new(ChainRepository::new(Arc::new(MemoryStore::new())));
        let headers = Arc::new(HeaderPersister::new(
            repository.clone(),
            context.clone(),
            GenesisBuilder::new().hash(),
        ));
        let persister = Arc::new(BlockPersister::new(headers, repository.clone()));
        for block in blocks {
            assert!(persister.persist(block.clone()).await.unwrap());
        }
        let current = persister.recover().await.unwrap();

        let config = NetworkConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            seeds,
            receive_interval_ms: 1,
            ..NetworkConfig::default()
        };
        let manager = Arc::new(PeerManager::new(context.clone()));
        let processor_config = ProcessorConfig {
            polling_interval: Duration::from_millis(10),
            ..ProcessorConfig::default()
        };
        let max_blocks = processor_config.max_blocks_per_request;
        let processor = Arc::new(BlockProcessor::new(
            Arc::new(BlockPool::new()),
            persister,
            context.clone(),
            manager.clone(),
            processor_config,
        ));

        let transactions = Arc::new(TransactionPool::new(1000));
        let processed = processor.subscribe();
        processor.run(current).unwrap();

        let server_context = Arc::new(ServerContext::new(&config, &context));
        let handlers: Vec<Arc<dyn MessageHandler>> = vec![
            Arc::new(VersionMessageHandler::new(server_context.clone(), context.clone())),
            Arc::new(VerAckMessageHandler::new(manager.clone())),
            Arc::new(BlockMessageHandler::new(processor.clone(), manager.clone())),
            Arc::new(TransactionMessageHandler::new(transactions.clone(), repository.clone())),
            Arc::new(GetBlocksMessageHandler::new(repository.clone(), max_blocks)),
        ];
        let server = Arc::new(Server::new(
            config,
            manager,
            Arc::new(MessageDispatcher::new(handlers)),
            server_context,
        ));
        server.follow_processed_blocks(processed);

        let address = server.start().await.unwrap();

        TestNode {
            context,
            processor,
            server,
            transactions,
            address,
        }
    }

    pub async fn wait_for_height(&self, height: u32) -> bool {
        for _ in 0..500 {
            if self.context.current_height() >= Some(height) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn wait_for_ready_peers(&self, count: usize) -> bool {
        for _ in 0..500 {
            if self.server.manager().ready_peers().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn shutdown(&self) {
        self.server.dispose().await;
        self.processor.shutdown().await;
    }
}
