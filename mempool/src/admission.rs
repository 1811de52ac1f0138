//! Background admission and confirmation
//!
//! Transactions enter the pool unverified. The admission worker verifies
//! them off the message path, relays the ones that pass and evicts the
//! rest. The confirmation hook drops transactions once a block carrying
//! them has been processed.

use crate::verifier::TransactionVerifier;
use crate::TransactionPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Block, Broadcaster, Message};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub admission_interval_ms: u64,
    /// Transactions verified per admission pass
    pub admission_batch: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_size: 50_000,
            admission_interval_ms: 100,
            admission_batch: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionReport {
    pub admitted: usize,
    pub evicted: usize,
}

pub struct AdmissionWorker {
    pool: Arc<TransactionPool>,
    verifier: Arc<TransactionVerifier>,
    broadcaster: Arc<dyn Broadcaster>,
    interval: Duration,
    batch: usize,
}

impl AdmissionWorker {
    pub fn new(
        pool: Arc<TransactionPool>,
        verifier: Arc<TransactionVerifier>,
        broadcaster: Arc<dyn Broadcaster>,
        config: &MempoolConfig,
    ) -> Self {
        AdmissionWorker {
            pool,
            verifier,
            broadcaster,
            interval: Duration::from_millis(config.admission_interval_ms),
            batch: config.admission_batch.max(1),
        }
    }

    /// Verify one batch of pending transactions
    pub async fn admit_pending(&self) -> AdmissionReport {
        let mut report = AdmissionReport::default();

        for tx in self.pool.unverified(self.batch).await {
            let hash = tx.hash().unwrap_or_else(|| tx.compute_hash());
            if self.verifier.verify(&tx) {
                if self.pool.mark_verified(&hash).await {
                    debug!(tx = %hash.short(), "transaction admitted, relaying");
                    self.broadcaster.broadcast(Message::Transaction(tx), None);
                    report.admitted += 1;
                }
            } else if self.pool.remove(&hash).await.is_some() {
                report.evicted += 1;
            }
        }

        if report.evicted > 0 {
            info!(admitted = report.admitted, evicted = report.evicted, "admission pass finished");
        }
        report
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.admit_pending().await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            debug!("admission worker stopped");
        })
    }
}

/// Remove confirmed transactions for every processed block
pub fn spawn_confirmation_hook(
    pool: Arc<TransactionPool>,
    mut processed: broadcast::Receiver<Block>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let block = tokio::select! {
                _ = cancel.cancelled() => break,
                received = processed.recv() => received,
            };
            match block {
                Ok(block) => {
                    let removed = pool.remove_confirmed(&block).await;
                    if removed > 0 {
                        debug!(height = block.index(), removed, "confirmed transactions left the mempool");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "confirmation hook lagged behind processed blocks");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
