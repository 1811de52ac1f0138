//! Persister recovery against a real sled store

use std::sync::Arc;
use strata_core::{
    Block, BlockPersister, ChainContext, GenesisBuilder, HeaderPersister, Repository, Transaction,
    TransactionKind,
};
use strata_storage::{ChainRepository, SledStore};
use tempfile::tempdir;

struct Opened {
    store: Arc<SledStore>,
    repository: Arc<ChainRepository>,
    persister: BlockPersister,
    context: Arc<ChainContext>,
}

impl Opened {
    /// Flush and release every handle so the next open can take the lock
    fn close(self) {
        self.store.flush().unwrap();
    }
}

fn open(path: &std::path::Path) -> Opened {
    let store = Arc::new(SledStore::open(path).unwrap());
    let repository = Arc::new(ChainRepository::new(store.clone()));
    let context = Arc::new(ChainContext::new());
    let headers = Arc::new(HeaderPersister::new(
        repository.clone(),
        context.clone(),
        GenesisBuilder::new().hash(),
    ));
    let persister = BlockPersister::new(headers, repository.clone());
    Opened {
        store,
        repository,
        persister,
        context,
    }
}

fn next_block(parent: &Block) -> Block {
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

#[tokio::test]
async fn test_restart_resumes_from_stored_tip() {
    let dir = tempdir().unwrap();
    let genesis = GenesisBuilder::new().build();
    let first = next_block(&genesis);
    let second = next_block(&first);

    let node = open(dir.path());
    assert!(node.persister.recover().await.unwrap().is_none());
    assert!(node.persister.persist(genesis.clone()).await.unwrap());
    assert!(node.persister.persist(first.clone()).await.unwrap());
    node.close();

    let node = open(dir.path());
    let current = node.persister.recover().await.unwrap().unwrap();
    assert_eq!(current.hash(), first.hash());
    assert_eq!(node.context.last_block_header().map(|h| h.index), Some(1));

    // The recovered tip accepts the next block and nothing else
    assert!(!node.persister.persist(first.clone()).await.unwrap());
    assert!(node.persister.persist(second).await.unwrap());
    node.close();
}

#[tokio::test]
async fn test_header_appended_before_crash_is_rolled_forward() {
    let dir = tempdir().unwrap();
    let genesis = GenesisBuilder::new().build();
    let first = next_block(&genesis);

    let node = open(dir.path());
    node.persister.persist(genesis.clone()).await.unwrap();
    // Crash after the header append, before the height write
    node.repository.add_block_header(&first.to_header()).unwrap();
    node.close();

    let node = open(dir.path());
    node.persister.recover().await.unwrap();
    assert_eq!(node.repository.total_block_header_height().unwrap(), Some(1));
    assert_eq!(node.repository.total_block_height().unwrap(), Some(0));

    // The body is written without appending the header a second time
    assert!(node.persister.persist(first.clone()).await.unwrap());
    assert_eq!(node.repository.total_block_height().unwrap(), Some(1));
    assert!(node.persister.is_block_persisted(&first.hash().unwrap()).unwrap());
    node.close();
}

#[tokio::test]
async fn test_stored_body_is_the_tip_after_restart() {
    let dir = tempdir().unwrap();
    let genesis = GenesisBuilder::new().build();
    let first = next_block(&genesis);
    let second = next_block(&first);

    let node = open(dir.path());
    node.persister.persist(genesis.clone()).await.unwrap();
    // Header and body of block 1 written, then the process dies
    node.persister.headers().persist(vec![first.to_header()]).await.unwrap();
    node.repository.add_block(&first).unwrap();
    node.close();

    let node = open(dir.path());
    let current = node.persister.recover().await.unwrap().unwrap();
    assert_eq!(current.hash(), first.hash());
    assert!(node.persister.is_block_persisted(&first.hash().unwrap()).unwrap());

    assert!(node.persister.persist(second.clone()).await.unwrap());
    assert_eq!(node.repository.total_block_height().unwrap(), Some(2));
    node.close();
}
