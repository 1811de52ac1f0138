//! Chain repository over a key-value store
//!
//! Key layout:
//! - `h/<height>` header, `m/header_height` header tip
//! - `b/<height>` block, `bh/<hash>` block height, `m/block_height` block tip
//! - `t/<hash>` transaction, `s/<hash><index>` spent marker, `a/<id>` asset

use crate::backend::{KeyValueStore, WriteBatch};
use crate::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use strata_core::{
    Asset, Block, BlockHeader, ChainQuery, CoinReference, Hash256, Repository, RepositoryResult,
    Transaction, TransactionKind, TransactionOutput,
};
use tracing::debug;

const HEADER_HEIGHT_KEY: &[u8] = b"m/header_height";
const BLOCK_HEIGHT_KEY: &[u8] = b"m/block_height";

fn height_key(prefix: &[u8], height: u32) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn hash_key(prefix: &[u8], hash: &Hash256) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

fn spent_key(reference: &CoinReference) -> Vec<u8> {
    let mut key = hash_key(b"s/", &reference.prev_hash);
    key.extend_from_slice(&reference.prev_index.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

pub struct ChainRepository {
    store: Arc<dyn KeyValueStore>,
}

impl ChainRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ChainRepository { store }
    }

    fn load<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), encode(value)?);
        self.store.write(batch)
    }

    fn block_body_batch(&self, block: &Block) -> Result<WriteBatch, StorageError> {
        let mut batch = WriteBatch::new();
        let block_hash = block.hash().unwrap_or_else(|| block.header.compute_hash());

        for tx in &block.transactions {
            let tx_hash = tx.hash().unwrap_or_else(|| tx.compute_hash());
            batch.put(hash_key(b"t/", &tx_hash), encode(tx)?);

            for input in &tx.inputs {
                batch.put(spent_key(input), tx_hash.as_bytes().to_vec());
            }

            if let TransactionKind::Register {
                asset_type,
                name,
                amount,
                precision,
                ..
            } = &tx.kind
            {
                let asset = Asset {
                    id: tx_hash,
                    asset_type: *asset_type,
                    name: name.clone(),
                    amount: *amount,
                    precision: *precision,
                };
                batch.put(hash_key(b"a/", &tx_hash), encode(&asset)?);
            }
        }

        batch.put(height_key(b"b/", block.index()), encode(block)?);
        batch.put(hash_key(b"bh/", &block_hash), encode(&block.index())?);
        batch.put(BLOCK_HEIGHT_KEY.to_vec(), encode(&block.index())?);
        Ok(batch)
    }
}

impl Repository for ChainRepository {
    fn add_block_header(&self, header: &BlockHeader) -> RepositoryResult<()> {
        Ok(self.put(&height_key(b"h/", header.index), header)?)
    }

    fn set_total_block_header_height(&self, height: u32) -> RepositoryResult<()> {
        Ok(self.put(HEADER_HEIGHT_KEY, &height)?)
    }

    fn total_block_header_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(self.load(HEADER_HEIGHT_KEY)?)
    }

    fn block_header(&self, height: u32) -> RepositoryResult<Option<BlockHeader>> {
        Ok(self.load(&height_key(b"h/", height))?)
    }

    fn add_block(&self, block: &Block) -> RepositoryResult<()> {
        let batch = self.block_body_batch(block)?;
        debug!(height = block.index(), ops = batch.len(), "writing block body");
        Ok(self.store.write(batch)?)
    }

    fn set_total_block_height(&self, height: u32) -> RepositoryResult<()> {
        Ok(self.put(BLOCK_HEIGHT_KEY, &height)?)
    }

    fn total_block_height(&self) -> RepositoryResult<Option<u32>> {
        Ok(self.load(BLOCK_HEIGHT_KEY)?)
    }

    fn block(&self, height: u32) -> RepositoryResult<Option<Block>> {
        Ok(self.load(&height_key(b"b/", height))?)
    }

    fn block_height_by_hash(&self, hash: &Hash256) -> RepositoryResult<Option<u32>> {
        Ok(self.load(&hash_key(b"bh/", hash))?)
    }
}

impl ChainQuery for ChainRepository {
    fn asset(&self, id: &Hash256) -> RepositoryResult<Option<Asset>> {
        Ok(self.load(&hash_key(b"a/", id))?)
    }

    fn transaction(&self, hash: &Hash256) -> RepositoryResult<Option<Transaction>> {
        Ok(self.load(&hash_key(b"t/", hash))?)
    }

    fn contains_transaction(&self, hash: &Hash256) -> RepositoryResult<bool> {
        Ok(self.store.get(&hash_key(b"t/", hash))?.is_some())
    }

    fn is_double_spend(&self, tx: &Transaction) -> RepositoryResult<bool> {
        for input in &tx.inputs {
            if self.store.get(&spent_key(input))?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn unspent_output(&self, reference: &CoinReference) -> RepositoryResult<Option<TransactionOutput>> {
        if self.store.get(&spent_key(reference))?.is_some() {
            return Ok(None);
        }
        Ok(self
            .transaction(&reference.prev_hash)?
            .and_then(|tx| tx.outputs.get(reference.prev_index as usize).cloned()))
    }

    fn current_block_height(&self) -> RepositoryResult<Option<u32>> {
        self.total_block_height()
    }

    fn current_block_hash(&self) -> RepositoryResult<Option<Hash256>> {
        match self.total_block_height()? {
            Some(height) => Ok(self.block(height)?.and_then(|b| b.hash())),
            None => Ok(None),
        }
    }
}
