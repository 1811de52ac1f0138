//! Node assembly: storage, chain pipeline, mempool and peer server

use crate::config::NodeConfig;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use strata_core::{
    BlockPersister, BlockPool, BlockProcessor, ChainContext, GenesisBuilder, HeaderPersister,
};
use strata_mempool::{
    spawn_confirmation_hook, AdmissionWorker, Ed25519WitnessVerifier, TransactionContext, TransactionPool,
    TransactionVerifier,
};
use strata_network::{
    BlockMessageHandler, GetBlocksMessageHandler, MessageDispatcher, MessageHandler, PeerManager, Server,
    ServerContext, TransactionMessageHandler, VerAckMessageHandler, VersionMessageHandler,
};
use strata_storage::ChainRepository;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Node {
    pub context: Arc<ChainContext>,
    pub processor: Arc<BlockProcessor>,
    pub transactions: Arc<TransactionPool>,
    pub server: Arc<Server>,
    pub local_addr: SocketAddr,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Node {
    pub async fn start(config: &NodeConfig) -> anyhow::Result<Node> {
        let store = config.storage.open().context("failed to open chain storage")?;
        let repository = Arc::new(ChainRepository::new(store));

        let genesis = GenesisBuilder::new();
        let context = Arc::new(ChainContext::new());
        let headers = Arc::new(HeaderPersister::new(
            repository.clone(),
            context.clone(),
            genesis.hash(),
        ));
        let persister = Arc::new(BlockPersister::new(headers, repository.clone()));

        let current = match persister.recover().await.context("failed to recover chain tip")? {
            Some(block) => block,
            None => {
                let block = genesis.build();
                persister
                    .persist(block.clone())
                    .await
                    .context("failed to persist genesis block")?;
                info!(hash = %genesis.hash(), "initialized chain from genesis");
                block
            }
        };
        info!(height = current.index(), "chain tip recovered");

        let manager = Arc::new(PeerManager::new(context.clone()));
        let processor_config = config.processor.processor_config();
        let max_blocks = processor_config.max_blocks_per_request;
        let processor = Arc::new(BlockProcessor::new(
            Arc::new(BlockPool::with_capacity(config.processor.block_pool_capacity)),
            persister,
            context.clone(),
            manager.clone(),
            processor_config,
        ));

        let cancel = CancellationToken::new();
        let transactions = Arc::new(TransactionPool::new(config.mempool.max_size));
        let verifier = Arc::new(TransactionVerifier::new(
            repository.clone(),
            TransactionContext::from_genesis(&genesis, config.fees.clone()),
            Arc::new(Ed25519WitnessVerifier),
        ));
        let workers = vec![
            AdmissionWorker::new(transactions.clone(), verifier, manager.clone(), &config.mempool)
                .spawn(cancel.child_token()),
            spawn_confirmation_hook(transactions.clone(), processor.subscribe(), cancel.child_token()),
        ];

        let processed = processor.subscribe();
        processor.run(Some(current))?;

        let server_context = Arc::new(ServerContext::new(&config.network, &context));
        let handlers: Vec<Arc<dyn MessageHandler>> = vec![
            Arc::new(VersionMessageHandler::new(server_context.clone(), context.clone())),
            Arc::new(VerAckMessageHandler::new(manager.clone())),
            Arc::new(BlockMessageHandler::new(processor.clone(), manager.clone())),
            Arc::new(TransactionMessageHandler::new(transactions.clone(), repository.clone())),
            Arc::new(GetBlocksMessageHandler::new(repository, max_blocks)),
        ];
        let server = Arc::new(Server::new(
            config.network.clone(),
            manager,
            Arc::new(MessageDispatcher::new(handlers)),
            server_context,
        ));
        server.follow_processed_blocks(processed);

        let local_addr = server.start().await.context("failed to start peer server")?;

        Ok(Node {
            context,
            processor,
            transactions,
            server,
            local_addr,
            cancel,
            workers,
        })
    }

    /// Stop networking first so no new blocks arrive, then drain the pipeline
    pub async fn shutdown(self) {
        self.server.dispose().await;
        self.processor.shutdown().await;
        self.cancel.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
        info!(height = ?self.context.current_height(), "node stopped");
    }
}
