//! Mempool - Pending Transaction Pool for Strata
//!
//! Holds transactions received from peers until they are verified, relayed
//! and finally confirmed in a block.

pub mod admission;
pub mod context;
pub mod error;
pub mod verifier;
pub mod witness;

#[cfg(test)]
pub(crate) mod test_utils;

pub use admission::{spawn_confirmation_hook, AdmissionReport, AdmissionWorker, MempoolConfig};
pub use context::{FeeSchedule, TransactionContext};
pub use error::{MempoolError, Rejection};
pub use verifier::TransactionVerifier;
pub use witness::{sign_witness, Ed25519WitnessVerifier, WitnessVerifier};

use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{Block, Hash256, Transaction};
use tokio::sync::RwLock;
use tracing::debug;

/// Transaction pool keyed by hash
pub struct TransactionPool {
    transactions: Arc<RwLock<HashMap<Hash256, MempoolEntry>>>,

    max_size: usize,
}

/// Entry in the mempool with metadata
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub transaction: Transaction,

    /// When it was added to mempool
    pub added_at: i64,

    /// Passed verification and was relayed
    pub verified: bool,
}

impl TransactionPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            max_size,
        }
    }

    /// Insert a transaction if its hash is unseen.
    ///
    /// Returns `Ok(false)` for a hash already in the pool; the existing
    /// entry is left untouched.
    pub async fn add(&self, mut tx: Transaction) -> Result<bool, MempoolError> {
        let hash = tx.sign();
        let mut pool = self.transactions.write().await;

        if pool.contains_key(&hash) {
            return Ok(false);
        }
        if pool.len() >= self.max_size {
            return Err(MempoolError::MempoolFull(self.max_size));
        }

        pool.insert(
            hash,
            MempoolEntry {
                transaction: tx,
                added_at: chrono::Utc::now().timestamp(),
                verified: false,
            },
        );
        debug!(tx = %hash.short(), size = pool.len(), "transaction added to mempool");
        Ok(true)
    }

    pub async fn contains(&self, hash: &Hash256) -> bool {
        self.transactions.read().await.contains_key(hash)
    }

    pub async fn get(&self, hash: &Hash256) -> Option<Transaction> {
        let pool = self.transactions.read().await;
        pool.get(hash).map(|entry| entry.transaction.clone())
    }

    pub async fn remove(&self, hash: &Hash256) -> Option<Transaction> {
        let mut pool = self.transactions.write().await;
        pool.remove(hash).map(|entry| entry.transaction)
    }

    /// Oldest transactions still waiting for verification
    pub async fn unverified(&self, limit: usize) -> Vec<Transaction> {
        let pool = self.transactions.read().await;
        let mut entries: Vec<&MempoolEntry> = pool.values().filter(|e| !e.verified).collect();
        entries.sort_by_key(|e| e.added_at);
        entries
            .into_iter()
            .take(limit)
            .map(|e| e.transaction.clone())
            .collect()
    }

    /// Returns false if the transaction left the pool in the meantime
    pub async fn mark_verified(&self, hash: &Hash256) -> bool {
        let mut pool = self.transactions.write().await;
        match pool.get_mut(hash) {
            Some(entry) => {
                entry.verified = true;
                true
            }
            None => false,
        }
    }

    pub async fn verified_transactions(&self) -> Vec<Transaction> {
        let pool = self.transactions.read().await;
        pool.values()
            .filter(|e| e.verified)
            .map(|e| e.transaction.clone())
            .collect()
    }

    /// Drop every transaction included in `block`
    pub async fn remove_confirmed(&self, block: &Block) -> usize {
        let mut pool = self.transactions.write().await;
        block
            .transactions
            .iter()
            .map(|tx| tx.hash().unwrap_or_else(|| tx.compute_hash()))
            .filter(|hash| pool.remove(hash).is_some())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}
