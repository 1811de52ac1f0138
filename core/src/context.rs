//! Shared chain context
//!
//! Field ownership:
//! - `current_block` and `is_syncing` are written by the block processor
//! - `last_block_header` is written by the header persister
//! - `is_peer_connected` and the best peer height are written by the peer layer
//!
//! Every field is read independently; no invariant spans two of them.

use crate::block::{Block, BlockHeader};
use crate::types::Hash256;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

const NO_HEIGHT: i64 = -1;

#[derive(Debug)]
pub struct ChainContext {
    current_block: RwLock<Option<Block>>,
    last_block_header: RwLock<Option<BlockHeader>>,
    is_syncing: AtomicBool,
    is_peer_connected: AtomicBool,
    best_peer_height: AtomicI64,
}

impl ChainContext {
    pub fn new() -> Self {
        ChainContext {
            current_block: RwLock::new(None),
            last_block_header: RwLock::new(None),
            is_syncing: AtomicBool::new(false),
            is_peer_connected: AtomicBool::new(false),
            best_peer_height: AtomicI64::new(NO_HEIGHT),
        }
    }

    pub fn current_block(&self) -> Option<Block> {
        self.current_block.read().clone()
    }

    pub fn current_height(&self) -> Option<u32> {
        self.current_block.read().as_ref().map(|b| b.index())
    }

    pub fn current_hash(&self) -> Option<Hash256> {
        self.current_block.read().as_ref().and_then(|b| b.hash())
    }

    pub fn set_current_block(&self, block: Option<Block>) {
        *self.current_block.write() = block;
    }

    pub fn last_block_header(&self) -> Option<BlockHeader> {
        self.last_block_header.read().clone()
    }

    pub fn set_last_block_header(&self, header: Option<BlockHeader>) {
        *self.last_block_header.write() = header;
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.is_syncing.store(syncing, Ordering::Release);
    }

    pub fn is_peer_connected(&self) -> bool {
        self.is_peer_connected.load(Ordering::Acquire)
    }

    pub fn set_peer_connected(&self, connected: bool) {
        self.is_peer_connected.store(connected, Ordering::Release);
    }

    /// Highest block height any peer has advertised
    pub fn best_peer_height(&self) -> Option<u32> {
        let height = self.best_peer_height.load(Ordering::Acquire);
        u32::try_from(height).ok()
    }

    /// Record a height advertised by a peer; keeps the maximum
    pub fn observe_peer_height(&self, height: u32) {
        self.best_peer_height
            .fetch_max(height as i64, Ordering::AcqRel);
    }

    /// True when a peer has advertised a block beyond our current one
    pub fn need_peer_sync(&self) -> bool {
        match (self.best_peer_height(), self.current_height()) {
            (Some(best), Some(current)) => best > current,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Default for ChainContext {
    fn default() -> Self {
        Self::new()
    }
}
