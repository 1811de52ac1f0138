//! Sequential header and block persistence
//!
//! `HeaderPersister` is the only writer of the header tip. Callers are
//! serialized through its tip lock, so a batch is validated and appended as
//! one unit and two batches never interleave.

use crate::block::{Block, BlockHeader, HeaderType};
use crate::context::ChainContext;
use crate::error::ChainError;
use crate::repository::Repository;
use crate::types::Hash256;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

pub struct HeaderPersister {
    repository: Arc<dyn Repository>,
    context: Arc<ChainContext>,
    genesis_hash: Hash256,
    tip: Mutex<Option<BlockHeader>>,
    persisted_tx: broadcast::Sender<Vec<BlockHeader>>,
}

impl HeaderPersister {
    pub fn new(repository: Arc<dyn Repository>, context: Arc<ChainContext>, genesis_hash: Hash256) -> Self {
        let (persisted_tx, _) = broadcast::channel(EVENT_CAPACITY);
        HeaderPersister {
            repository,
            context,
            genesis_hash,
            tip: Mutex::new(None),
            persisted_tx,
        }
    }

    /// Receives each newly persisted contiguous run of headers exactly once
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<BlockHeader>> {
        self.persisted_tx.subscribe()
    }

    pub async fn tip(&self) -> Option<BlockHeader> {
        self.tip.lock().await.clone()
    }

    /// Rebuild the tip from storage.
    ///
    /// Starts at the recorded header height and rolls forward over headers
    /// that were appended before the height write reached disk.
    pub async fn recover(&self) -> Result<Option<BlockHeader>, ChainError> {
        let mut tip = self.tip.lock().await;

        let mut height = self.repository.total_block_header_height()?;
        let mut header = match height {
            Some(h) => self.repository.block_header(h)?,
            None => None,
        };

        loop {
            let next = height.map_or(0, |h| h + 1);
            match self.repository.block_header(next)? {
                Some(candidate) if Self::accepts(header.as_ref(), &candidate, self.genesis_hash) => {
                    warn!(height = next, "rolling header tip forward past recorded height");
                    self.repository.set_total_block_header_height(next)?;
                    height = Some(next);
                    header = Some(candidate);
                }
                _ => break,
            }
        }

        if let Some(ref h) = header {
            info!(height = h.index, "recovered header tip");
        }
        *tip = header.clone();
        self.context.set_last_block_header(header.clone());
        Ok(header)
    }

    /// Persist a batch of headers.
    ///
    /// Headers at or below the tip are skipped, duplicates by index keep the
    /// first occurrence, and the rest are applied in ascending index order
    /// until the first one that does not extend the tip. Returns the headers
    /// that were newly persisted.
    pub async fn persist(&self, headers: Vec<BlockHeader>) -> Result<Vec<BlockHeader>, ChainError> {
        let mut tip = self.tip.lock().await;
        let tip_index = tip.as_ref().map(|h| h.index);

        let mut batch: BTreeMap<u32, BlockHeader> = BTreeMap::new();
        for header in headers {
            if tip_index.map_or(true, |t| header.index > t) {
                batch.entry(header.index).or_insert(header);
            }
        }

        let mut persisted = Vec::new();
        let mut failure = None;
        for (_, mut header) in batch {
            let hash = header.sign();
            if !Self::accepts(tip.as_ref(), &header, self.genesis_hash) {
                debug!(
                    height = header.index,
                    hash = %hash.short(),
                    tip = ?tip.as_ref().map(|h| h.index),
                    "header does not extend tip, halting batch"
                );
                break;
            }

            let appended = self
                .repository
                .add_block_header(&header)
                .and_then(|_| self.repository.set_total_block_header_height(header.index));
            if let Err(e) = appended {
                error!(height = header.index, error = %e, "failed to append header");
                failure = Some(e);
                break;
            }

            *tip = Some(header.clone());
            self.context.set_last_block_header(Some(header.clone()));
            persisted.push(header);
        }

        if !persisted.is_empty() {
            // No subscribers is fine
            let _ = self.persisted_tx.send(persisted.clone());
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(persisted),
        }
    }

    /// Linkage rule for the next header
    pub fn accepts(tip: Option<&BlockHeader>, header: &BlockHeader, genesis_hash: Hash256) -> bool {
        if header.header_type != HeaderType::Extended {
            return false;
        }
        match tip {
            Some(tip) => {
                tip.index.checked_add(1) == Some(header.index)
                    && tip.hash() == Some(header.previous_block_hash)
            }
            None => header.index == 0 && header.hash() == Some(genesis_hash),
        }
    }
}

/// Persists full blocks on top of the header chain
pub struct BlockPersister {
    headers: Arc<HeaderPersister>,
    repository: Arc<dyn Repository>,
    write_lock: Mutex<()>,
}

impl BlockPersister {
    pub fn new(headers: Arc<HeaderPersister>, repository: Arc<dyn Repository>) -> Self {
        BlockPersister {
            headers,
            repository,
            write_lock: Mutex::new(()),
        }
    }

    pub fn headers(&self) -> &Arc<HeaderPersister> {
        &self.headers
    }

    pub fn is_block_persisted(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.repository.block_height_by_hash(hash)?.is_some())
    }

    pub fn total_block_height(&self) -> Result<Option<u32>, ChainError> {
        Ok(self.repository.total_block_height()?)
    }

    /// Recover both tips and return the current block.
    ///
    /// Like the header tip, the block tip rolls forward over bodies that were
    /// written before the height write reached disk, as long as each one
    /// matches the stored header at its height.
    pub async fn recover(&self) -> Result<Option<Block>, ChainError> {
        let _guard = self.write_lock.lock().await;
        self.headers.recover().await?;

        let mut height = self.repository.total_block_height()?;
        let mut current = match height {
            Some(h) => {
                let block = self.repository.block(h)?;
                if block.is_none() {
                    warn!(height = h, "block height recorded but body missing");
                }
                block
            }
            None => None,
        };

        loop {
            let next = match height {
                Some(h) => match h.checked_add(1) {
                    Some(next) => next,
                    None => break,
                },
                None => 0,
            };
            let Some(block) = self.repository.block(next)? else {
                break;
            };
            let header_hash = self.repository.block_header(next)?.and_then(|h| h.hash());
            if header_hash.is_none() || header_hash != block.hash() {
                break;
            }

            warn!(height = next, "rolling block tip forward past recorded height");
            self.repository.set_total_block_height(next)?;
            height = Some(next);
            current = Some(block);
        }

        if let Some(ref block) = current {
            info!(height = block.index(), "recovered block tip");
        }
        Ok(current)
    }

    /// Persist the next block.
    ///
    /// Returns `Ok(false)` when the block is not the next one or its header
    /// does not link. A block whose header was appended before a crash is
    /// resumed without appending the header again.
    pub async fn persist(&self, mut block: Block) -> Result<bool, ChainError> {
        let hash = block.sign();
        let _guard = self.write_lock.lock().await;

        let next = self.repository.total_block_height()?.map_or(0, |h| h + 1);
        if block.index() != next {
            debug!(height = block.index(), next, "block is not next in line");
            return Ok(false);
        }

        match self.repository.block_header(next)? {
            Some(stored) if stored.hash() == Some(hash) => {
                info!(height = next, hash = %hash.short(), "resuming block with stored header");
            }
            Some(stored) => {
                warn!(
                    height = next,
                    hash = %hash.short(),
                    stored = ?stored.hash(),
                    "block conflicts with stored header"
                );
                return Ok(false);
            }
            None => {
                let persisted = self.headers.persist(vec![block.to_header()]).await?;
                if persisted.is_empty() {
                    return Ok(false);
                }
            }
        }

        self.repository.add_block(&block)?;
        self.repository.set_total_block_height(next)?;
        debug!(height = next, hash = %hash.short(), txs = block.transactions.len(), "block persisted");
        Ok(true)
    }
}
