//! Out-of-order block buffer
//!
//! Holds received blocks keyed by height until the processor asks for them.
//! One block per height; the first one to arrive wins.

use crate::block::Block;
use crate::error::ChainError;
use crate::types::Hash256;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct PoolInner {
    by_height: HashMap<u32, Block>,
    heights_by_hash: HashMap<Hash256, u32>,
}

#[derive(Debug)]
pub struct BlockPool {
    inner: RwLock<PoolInner>,
    capacity: usize,
}

impl BlockPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BlockPool {
            inner: RwLock::new(PoolInner::default()),
            capacity,
        }
    }

    /// Queue a block under its height.
    ///
    /// Fails with `AlreadyQueued` when the height is taken and `PoolFull`
    /// when the pool has reached capacity. The pool is unchanged on error.
    pub fn add(&self, mut block: Block) -> Result<(), ChainError> {
        let hash = block.sign();
        let height = block.index();

        let mut inner = self.inner.write();
        if inner.by_height.contains_key(&height) || inner.heights_by_hash.contains_key(&hash) {
            return Err(ChainError::AlreadyQueued(hash));
        }
        if inner.by_height.len() >= self.capacity {
            warn!(height, capacity = self.capacity, "block pool full, dropping block");
            return Err(ChainError::PoolFull(self.capacity));
        }

        inner.heights_by_hash.insert(hash, height);
        inner.by_height.insert(height, block);
        Ok(())
    }

    pub fn try_get(&self, height: u32) -> Option<Block> {
        self.inner.read().by_height.get(&height).cloned()
    }

    pub fn remove(&self, height: u32) -> Option<Block> {
        let mut inner = self.inner.write();
        let block = inner.by_height.remove(&height)?;
        if let Some(hash) = block.hash() {
            inner.heights_by_hash.remove(&hash);
        }
        Some(block)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.inner.read().heights_by_hash.contains_key(hash)
    }

    /// Drop every block at or below `height`
    pub fn prune_through(&self, height: u32) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<u32> = inner
            .by_height
            .keys()
            .copied()
            .filter(|h| *h <= height)
            .collect();
        for h in &stale {
            if let Some(block) = inner.by_height.remove(h) {
                if let Some(hash) = block.hash() {
                    inner.heights_by_hash.remove(&hash);
                }
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}
