//! Shared fakes for unit tests

use crate::asset::Asset;
use crate::block::{Block, BlockHeader};
use crate::broadcast::{Broadcaster, PeerId};
use crate::error::RepositoryError;
use crate::genesis::GenesisBuilder;
use crate::message::Message;
use crate::repository::{ChainQuery, Repository, RepositoryResult};
use crate::transaction::{CoinReference, Transaction, TransactionKind, TransactionOutput};
use crate::types::Hash256;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Genesis followed by `len - 1` linked blocks, all signed
pub fn chain(len: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(len);
    if len == 0 {
        return blocks;
    }
    let genesis = GenesisBuilder::new().build();
    let mut previous = genesis.hash().unwrap();
    blocks.push(genesis);

    for index in 1..len as u32 {
        let mut block = Block::new(
            index,
            previous,
            1_700_000_000 + index,
            index as u64,
            vec![Transaction::new(TransactionKind::Miner { nonce: index })],
        );
        previous = block.sign();
        blocks.push(block);
    }
    blocks
}

#[derive(Default)]
struct State {
    headers: HashMap<u32, BlockHeader>,
    header_height: Option<u32>,
    blocks: HashMap<u32, Block>,
    block_heights: HashMap<Hash256, u32>,
    block_height: Option<u32>,
    transactions: HashMap<Hash256, Transaction>,
    spent: HashSet<CoinReference>,
    header_appends: Vec<u32>,
}

/// In-memory repository that records every header append
#[derive(Default)]
pub struct RecordingRepository {
    state: Mutex<State>,
    fail_appends: AtomicBool,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heights passed to `add_block_header`, in call order
    pub fn header_appends(&self) -> Vec<u32> {
        self.state.lock().header_appends.clone()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Simulate a crash after a header append but before the height write
    pub fn append_header_only(&self, header: &BlockHeader) {
        self.state.lock().headers.insert(header.index, header.clone());
    }
}

impl Repository for RecordingRepository {
    fn add_block_header(&self, header: &BlockHeader) -> RepositoryResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("disk full".to_string()));
        }
        let mut state = self.state.lock();
        state.header_appends.push(header.index);
        state.headers.insert(header.index, header.clone());
        Ok(())
    }

    fn set_total_block_header_height(&self, height: u32) -> RepositoryResult<()> {
        self.state.lock().header_height = Some(height);
        Ok(())
    }

    fn total_block_header_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(self.state.lock().header_height)
    }

    fn block_header(&self, height: u32) -> RepositoryResult<Option<BlockHeader>> {
        Ok(self.state.lock().headers.get(&height).cloned())
    }

    fn add_block(&self, block: &Block) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        for tx in &block.transactions {
            if let Some(hash) = tx.hash() {
                state.transactions.insert(hash, tx.clone());
            }
            state.spent.extend(tx.inputs.iter().copied());
        }
        if let Some(hash) = block.hash() {
            state.block_heights.insert(hash, block.index());
        }
        state.blocks.insert(block.index(), block.clone());
        Ok(())
    }

    fn set_total_block_height(&self, height: u32) -> RepositoryResult<()> {
        self.state.lock().block_height = Some(height);
        Ok(())
    }

    fn total_block_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(self.state.lock().block_height)
    }

    fn block(&self, height: u32) -> RepositoryResult<Option<Block>> {
        Ok(self.state.lock().blocks.get(&height).cloned())
    }

    fn block_height_by_hash(&self, hash: &Hash256) -> RepositoryResult<Option<u32>> {
        Ok(self.state.lock().block_heights.get(hash).copied())
    }
}

impl ChainQuery for RecordingRepository {
    fn asset(&self, _id: &Hash256) -> RepositoryResult<Option<Asset>> {
        Ok(None)
    }

    fn transaction(&self, hash: &Hash256) -> RepositoryResult<Option<Transaction>> {
        Ok(self.state.lock().transactions.get(hash).cloned())
    }

    fn is_double_spend(&self, tx: &Transaction) -> RepositoryResult<bool> {
        let state = self.state.lock();
        Ok(tx.inputs.iter().any(|input| state.spent.contains(input)))
    }

    fn unspent_output(&self, reference: &CoinReference) -> RepositoryResult<Option<TransactionOutput>> {
        let state = self.state.lock();
        if state.spent.contains(reference) {
            return Ok(None);
        }
        Ok(state
            .transactions
            .get(&reference.prev_hash)
            .and_then(|tx| tx.outputs.get(reference.prev_index as usize))
            .cloned())
    }

    fn current_block_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(self.state.lock().block_height)
    }

    fn current_block_hash(&self) -> RepositoryResult<Option<Hash256>> {
        let state = self.state.lock();
        Ok(state
            .block_height
            .and_then(|height| state.blocks.get(&height))
            .and_then(|block| block.hash()))
    }
}

/// Broadcaster that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<(Message, Option<PeerId>)>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Message, Option<PeerId>)> {
        self.sent.lock().clone()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: Message, exclude: Option<PeerId>) {
        self.sent.lock().push((message, exclude));
    }
}
