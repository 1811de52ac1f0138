//! Block processor
//!
//! Drains the block pool in strict height order through the block persister.
//! It is the only consumer of the pool and the only place the current block
//! advances, so each height is persisted at most once.

use crate::block::Block;
use crate::block_pool::BlockPool;
use crate::broadcast::Broadcaster;
use crate::context::ChainContext;
use crate::error::ChainError;
use crate::message::Message;
use crate::persister::BlockPersister;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Wait between pool polls when the next height is missing
    pub polling_interval: Duration,
    /// Give up on an outstanding sync request after this long without progress
    pub sync_timeout: Duration,
    /// Blocks a peer returns per request; a full batch triggers the next request
    pub max_blocks_per_request: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            polling_interval: Duration::from_millis(100),
            sync_timeout: Duration::from_secs(30),
            max_blocks_per_request: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockOutcome {
    Queued,
    /// Already durably persisted; nothing to do
    AlreadyPersisted,
    /// At or below the current height but not ours; dropped
    Stale,
}

/// Progress of the outstanding sync request
struct SyncRound {
    last_progress: Instant,
    received: u32,
}

pub struct BlockProcessor {
    pool: Arc<BlockPool>,
    persister: Arc<BlockPersister>,
    context: Arc<ChainContext>,
    broadcaster: Arc<dyn Broadcaster>,
    config: ProcessorConfig,
    cancel: CancellationToken,
    processed_tx: broadcast::Sender<Block>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BlockProcessor {
    pub fn new(
        pool: Arc<BlockPool>,
        persister: Arc<BlockPersister>,
        context: Arc<ChainContext>,
        broadcaster: Arc<dyn Broadcaster>,
        config: ProcessorConfig,
    ) -> Self {
        let (processed_tx, _) = broadcast::channel(EVENT_CAPACITY);
        BlockProcessor {
            pool,
            persister,
            context,
            broadcaster,
            config,
            cancel: CancellationToken::new(),
            processed_tx,
            task: Mutex::new(None),
        }
    }

    /// Fires once per block after it has been persisted
    pub fn subscribe(&self) -> broadcast::Receiver<Block> {
        self.processed_tx.subscribe()
    }

    pub fn pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }

    /// Queue a block received from the network.
    ///
    /// Never persists directly; the loop picks the block up once every lower
    /// height has been persisted.
    pub fn add_block(&self, mut block: Block) -> Result<AddBlockOutcome, ChainError> {
        let hash = block.sign();
        if hash.is_zero() {
            return Err(ChainError::ZeroHash);
        }
        if self.persister.is_block_persisted(&hash)? {
            return Ok(AddBlockOutcome::AlreadyPersisted);
        }
        if self.pool.contains(&hash) {
            return Err(ChainError::AlreadyQueued(hash));
        }
        if let Some(current) = self.context.current_height() {
            if block.index() <= current {
                debug!(height = block.index(), current, hash = %hash.short(), "dropping stale block");
                return Ok(AddBlockOutcome::Stale);
            }
        }

        let height = block.index();
        self.pool.add(block)?;
        debug!(height, hash = %hash.short(), pool = self.pool.len(), "block queued");
        Ok(AddBlockOutcome::Queued)
    }

    /// Start the drain loop from `initial_block`.
    ///
    /// The context holds `initial_block` as the current block by the time
    /// this returns.
    pub fn run(self: &Arc<Self>, initial_block: Option<Block>) -> Result<(), ChainError> {
        let mut task = self.task.lock();
        if task.is_some() || self.cancel.is_cancelled() {
            return Err(ChainError::AlreadyRunning);
        }
        self.context.set_current_block(initial_block.clone());

        let processor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            processor.drain_loop(initial_block).await;
        }));
        Ok(())
    }

    /// Signal the loop to exit at its next wait
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the loop to finish
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "block processor task failed");
            }
        }
    }

    async fn drain_loop(&self, initial_block: Option<Block>) {
        let mut current = initial_block;
        let mut round: Option<SyncRound> = None;

        info!(height = ?current.as_ref().map(|b| b.index()), "block processor started");

        while !self.cancel.is_cancelled() {
            self.update_sync(current.as_ref(), &mut round);

            let want = match current.as_ref().map(|b| b.index().checked_add(1)) {
                None => 0,
                Some(Some(next)) => next,
                Some(None) => {
                    error!(height = u32::MAX, "block height space exhausted, stopping");
                    break;
                }
            };
            if let Some(block) = self.pool.try_get(want) {
                match self.persister.persist(block.clone()).await {
                    Ok(true) => {
                        self.pool.remove(want);
                        self.context.set_current_block(Some(block.clone()));
                        if let Some(round) = round.as_mut() {
                            round.last_progress = Instant::now();
                            round.received += 1;
                        }
                        debug!(height = want, "block processed");
                        let _ = self.processed_tx.send(block.clone());
                        current = Some(block);
                        continue;
                    }
                    Ok(false) => {
                        warn!(height = want, "queued block rejected by persister, discarding");
                        self.pool.remove(want);
                    }
                    Err(e) => {
                        error!(height = want, error = %e, "failed to persist block");
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.polling_interval) => {}
            }
        }

        info!("block processor stopped");
    }

    fn update_sync(&self, current: Option<&Block>, round: &mut Option<SyncRound>) {
        if self.context.is_syncing() {
            let height = current.map(|b| b.index());
            let caught_up = match (self.context.best_peer_height(), height) {
                (Some(best), Some(h)) => h >= best,
                _ => false,
            };
            let (batch_done, timed_out) = match round.as_ref() {
                Some(r) => (
                    r.received >= self.config.max_blocks_per_request,
                    r.last_progress.elapsed() >= self.config.sync_timeout,
                ),
                None => (false, true),
            };

            if caught_up || batch_done || timed_out {
                debug!(height = ?height, caught_up, batch_done, timed_out, "sync round finished");
                self.context.set_syncing(false);
                *round = None;
            }
        }

        if self.context.is_peer_connected() && self.context.need_peer_sync() && !self.context.is_syncing() {
            let start = current.and_then(|b| b.hash());
            info!(
                height = ?current.map(|b| b.index()),
                best = ?self.context.best_peer_height(),
                "requesting blocks from peers"
            );
            self.broadcaster.broadcast(Message::get_blocks(start), None);
            self.context.set_syncing(true);
            *round = Some(SyncRound {
                last_progress: Instant::now(),
                received: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::GenesisBuilder;
    use crate::persister::HeaderPersister;
    use crate::repository::Repository;
    use crate::test_utils::{chain, RecordingBroadcaster, RecordingRepository};

    struct Harness {
        repository: Arc<RecordingRepository>,
        broadcaster: Arc<RecordingBroadcaster>,
        context: Arc<ChainContext>,
        processor: Arc<BlockProcessor>,
    }

    fn harness(config: ProcessorConfig) -> Harness {
        let repository = Arc::new(RecordingRepository::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let context = Arc::new(ChainContext::new());
        let headers = Arc::new(HeaderPersister::new(
            repository.clone(),
            context.clone(),
            GenesisBuilder::new().hash(),
        ));
        let persister = Arc::new(BlockPersister::new(headers, repository.clone()));
        let processor = Arc::new(BlockProcessor::new(
            Arc::new(BlockPool::new()),
            persister,
            context.clone(),
            broadcaster.clone(),
            config,
        ));
        Harness {
            repository,
            broadcaster,
            context,
            processor,
        }
    }

    async fn wait_for_height(context: &ChainContext, height: u32) {
        for _ in 0..200 {
            if context.current_height() == Some(height) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("processor never reached height {}", height);
    }

    #[tokio::test]
    async fn test_reverse_arrival_persists_in_order() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(3);
        let mut processed = h.processor.subscribe();

        for block in blocks.iter().rev() {
            assert_eq!(h.processor.add_block(block.clone()).unwrap(), AddBlockOutcome::Queued);
        }

        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 2).await;
        h.processor.shutdown().await;

        assert_eq!(h.repository.header_appends(), vec![0, 1, 2]);
        assert_eq!(h.repository.total_block_height().unwrap(), Some(2));
        assert!(h.processor.pool().is_empty());

        for expected in 0..3 {
            assert_eq!(processed.recv().await.unwrap().index(), expected);
        }
    }

    #[tokio::test]
    async fn test_duplicate_delivery_persists_once() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(2);

        h.processor.add_block(blocks[1].clone()).unwrap();
        assert!(matches!(
            h.processor.add_block(blocks[1].clone()),
            Err(ChainError::AlreadyQueued(_))
        ));
        h.processor.add_block(blocks[0].clone()).unwrap();

        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 1).await;

        assert_eq!(
            h.processor.add_block(blocks[1].clone()).unwrap(),
            AddBlockOutcome::AlreadyPersisted
        );
        h.processor.shutdown().await;

        assert_eq!(h.repository.header_appends(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_stale_block_is_dropped() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(2);
        h.processor.add_block(blocks[0].clone()).unwrap();
        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 0).await;

        let mut rival = crate::block::Block::new(0, Default::default(), 5, 5, blocks[1].transactions.clone());
        rival.sign();
        assert_eq!(h.processor.add_block(rival).unwrap(), AddBlockOutcome::Stale);
        h.processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let h = harness(ProcessorConfig::default());
        h.processor.run(None).unwrap();
        assert_eq!(h.processor.run(None), Err(ChainError::AlreadyRunning));
        h.processor.shutdown().await;
        // Shutdown is idempotent
        h.processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_blocks_when_behind() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(1);
        h.context.set_peer_connected(true);
        h.context.observe_peer_height(10);

        h.processor.run(Some(blocks[0].clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.processor.shutdown().await;

        let sent = h.broadcaster.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].0 {
            Message::GetBlocks(payload) => {
                assert_eq!(payload.start(), blocks[0].hash());
                assert_eq!(payload.stop(), None);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(h.context.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_request_times_out() {
        let config = ProcessorConfig {
            sync_timeout: Duration::from_secs(5),
            ..ProcessorConfig::default()
        };
        let h = harness(config);
        h.context.set_peer_connected(true);
        h.context.observe_peer_height(10);

        h.processor.run(Some(chain(1).remove(0))).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.broadcaster.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        h.processor.shutdown().await;

        // The stale round is abandoned and a fresh request goes out
        assert_eq!(h.broadcaster.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_clears_once_caught_up() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(3);
        h.context.set_peer_connected(true);
        h.context.observe_peer_height(2);

        h.processor.add_block(blocks[0].clone()).unwrap();
        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 0).await;
        assert!(h.context.is_syncing());

        h.processor.add_block(blocks[2].clone()).unwrap();
        h.processor.add_block(blocks[1].clone()).unwrap();
        wait_for_height(&h.context, 2).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.processor.shutdown().await;

        assert!(!h.context.is_syncing());
        assert!(!h.context.need_peer_sync());
    }

    #[tokio::test]
    async fn test_rejected_block_is_discarded() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(2);
        h.processor.add_block(blocks[0].clone()).unwrap();

        // Right height, wrong parent
        let orphan = crate::block::Block::new(1, Default::default(), 9, 9, blocks[1].transactions.clone());
        h.processor.add_block(orphan).unwrap();

        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 0).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.processor.shutdown().await;

        assert!(h.processor.pool().try_get(1).is_none());
        assert_eq!(h.repository.header_appends(), vec![0]);
    }

    #[tokio::test]
    async fn test_run_publishes_initial_block_immediately() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(1);

        h.processor.run(Some(blocks[0].clone())).unwrap();
        assert_eq!(h.context.current_height(), Some(0));
        assert_eq!(h.context.current_hash(), blocks[0].hash());
        h.processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_after_unrecorded_body_keeps_advancing() {
        let h = harness(ProcessorConfig::default());
        let blocks = chain(3);
        h.processor.add_block(blocks[0].clone()).unwrap();
        h.processor.run(None).unwrap();
        wait_for_height(&h.context, 0).await;
        h.processor.shutdown().await;

        // Block 1 body written, height write lost
        h.processor.persister.headers().persist(vec![blocks[1].to_header()]).await.unwrap();
        h.repository.add_block(&blocks[1]).unwrap();

        let context = Arc::new(ChainContext::new());
        let headers = Arc::new(HeaderPersister::new(
            h.repository.clone(),
            context.clone(),
            GenesisBuilder::new().hash(),
        ));
        let persister = Arc::new(BlockPersister::new(headers, h.repository.clone()));
        let current = persister.recover().await.unwrap();
        let processor = Arc::new(BlockProcessor::new(
            Arc::new(BlockPool::new()),
            persister,
            context.clone(),
            h.broadcaster.clone(),
            ProcessorConfig::default(),
        ));
        processor.run(current).unwrap();
        assert_eq!(context.current_height(), Some(1));

        assert_eq!(
            processor.add_block(blocks[1].clone()).unwrap(),
            AddBlockOutcome::AlreadyPersisted
        );
        assert_eq!(processor.add_block(blocks[2].clone()).unwrap(), AddBlockOutcome::Queued);
        wait_for_height(&context, 2).await;
        processor.shutdown().await;

        assert_eq!(h.repository.total_block_height().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_loop_stops_at_last_height() {
        let h = harness(ProcessorConfig::default());
        let mut last = crate::block::Block::new(u32::MAX, Default::default(), 0, 0, vec![]);
        last.sign();

        h.processor.run(Some(last)).unwrap();
        tokio::time::timeout(Duration::from_secs(2), h.processor.shutdown())
            .await
            .unwrap();
        assert_eq!(h.context.current_height(), Some(u32::MAX));
    }
}
