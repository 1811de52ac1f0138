use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use strata_core::{
    Asset, ChainQuery, CoinReference, Fixed8, Hash160, Hash256, RepositoryResult, Transaction,
    TransactionOutput,
};

pub fn output(asset_id: Hash256, value: Fixed8) -> TransactionOutput {
    TransactionOutput {
        asset_id,
        value,
        script_hash: Hash160([1u8; 20]),
    }
}

/// Chain query with canned answers that counts how often it is asked
#[derive(Default)]
pub struct ScriptedChain {
    assets: Mutex<HashMap<Hash256, Asset>>,
    transactions: Mutex<HashMap<Hash256, Transaction>>,
    double_spend: AtomicBool,
    queries: AtomicUsize,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&self, asset: Asset) {
        self.assets.lock().unwrap().insert(asset.id, asset);
    }

    pub fn add_transaction(&self, mut tx: Transaction) {
        let hash = tx.sign();
        self.transactions.lock().unwrap().insert(hash, tx);
    }

    pub fn set_double_spend(&self, flag: bool) {
        self.double_spend.store(flag, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

impl ChainQuery for ScriptedChain {
    fn asset(&self, id: &Hash256) -> RepositoryResult<Option<Asset>> {
        self.count();
        Ok(self.assets.lock().unwrap().get(id).cloned())
    }

    fn transaction(&self, hash: &Hash256) -> RepositoryResult<Option<Transaction>> {
        self.count();
        Ok(self.transactions.lock().unwrap().get(hash).cloned())
    }

    fn is_double_spend(&self, _tx: &Transaction) -> RepositoryResult<bool> {
        self.count();
        Ok(self.double_spend.load(Ordering::SeqCst))
    }

    fn unspent_output(&self, reference: &CoinReference) -> RepositoryResult<Option<TransactionOutput>> {
        self.count();
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(&reference.prev_hash)
            .and_then(|tx| tx.outputs.get(reference.prev_index as usize))
            .cloned())
    }

    fn current_block_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(None)
    }

    fn current_block_hash(&self) -> RepositoryResult<Option<Hash256>> {
        Ok(None)
    }
}
