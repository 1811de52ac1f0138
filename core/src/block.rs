//! Block structures and functionality

use crate::transaction::Transaction;
use crate::types::{Hash160, Hash256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("Invalid block hash")]
    InvalidHash,

    #[error("Invalid merkle root")]
    InvalidMerkleRoot,

    #[error("Invalid miner transaction")]
    InvalidMinerTransaction,

    #[error("Transaction {0} hash does not match its content")]
    InvalidTransactionHash(Hash256),

    #[error("Block has no transactions")]
    NoTransactions,
}

/// Whether a header travelled with its block body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderType {
    Unsigned,
    /// Header of a full block; the only kind the persister accepts
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Block height
    pub index: u32,
    pub previous_block_hash: Hash256,
    pub merkle_root: Hash256,
    /// Unix seconds
    pub timestamp: u32,
    pub consensus_data: u64,
    /// Script hash of the next validator set
    pub next_consensus: Hash160,
    pub header_type: HeaderType,
    #[serde(default)]
    hash: Option<Hash256>,
}

impl BlockHeader {
    pub fn new(index: u32, previous_block_hash: Hash256, merkle_root: Hash256, timestamp: u32) -> Self {
        BlockHeader {
            version: 0,
            index,
            previous_block_hash,
            merkle_root,
            timestamp,
            consensus_data: 0,
            next_consensus: Hash160::ZERO,
            header_type: HeaderType::Unsigned,
            hash: None,
        }
    }

    pub fn hash(&self) -> Option<Hash256> {
        self.hash
    }

    /// Compute and store the hash if it has not been computed yet
    pub fn sign(&mut self) -> Hash256 {
        match self.hash {
            Some(hash) => hash,
            None => {
                let hash = self.compute_hash();
                self.hash = Some(hash);
                hash
            }
        }
    }

    /// Double SHA-256 of the header fields (type and hash excluded)
    pub fn compute_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.previous_block_hash.0);
        buf.extend_from_slice(&self.merkle_root.0);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.consensus_data.to_le_bytes());
        buf.extend_from_slice(&self.next_consensus.0);
        Hash256::digest(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// All transactions in the block (first one must be the miner transaction)
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block, signing its transactions and filling in the merkle root
    pub fn new(
        index: u32,
        previous_block_hash: Hash256,
        timestamp: u32,
        consensus_data: u64,
        mut transactions: Vec<Transaction>,
    ) -> Self {
        let hashes: Vec<Hash256> = transactions.iter_mut().map(|tx| tx.sign()).collect();
        let mut header = BlockHeader::new(index, previous_block_hash, merkle_root(&hashes), timestamp);
        header.consensus_data = consensus_data;
        header.header_type = HeaderType::Extended;

        Block {
            header,
            transactions,
        }
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }

    pub fn hash(&self) -> Option<Hash256> {
        self.header.hash()
    }

    /// Sign every transaction and the header; returns the block hash
    pub fn sign(&mut self) -> Hash256 {
        for tx in &mut self.transactions {
            tx.sign();
        }
        self.header.sign()
    }

    /// The header as persisted alongside this block
    pub fn to_header(&self) -> BlockHeader {
        let mut header = self.header.clone();
        header.header_type = HeaderType::Extended;
        header
    }

    /// Calculate the merkle root of all transactions
    pub fn calculate_merkle_root(&self) -> Hash256 {
        let hashes: Vec<Hash256> = self.transactions.iter().map(|tx| tx.compute_hash()).collect();
        merkle_root(&hashes)
    }

    /// Validate block structure (not including transaction validation against chain state)
    pub fn validate_structure(&self) -> Result<(), BlockError> {
        // Must have at least one transaction (miner)
        let first = self.transactions.first().ok_or(BlockError::NoTransactions)?;

        if !first.is_miner() || self.transactions[1..].iter().any(|tx| tx.is_miner()) {
            return Err(BlockError::InvalidMinerTransaction);
        }

        for tx in &self.transactions {
            if !tx.is_hash_consistent() {
                return Err(BlockError::InvalidTransactionHash(
                    tx.hash().unwrap_or(Hash256::ZERO),
                ));
            }
        }

        if self.calculate_merkle_root() != self.header.merkle_root {
            return Err(BlockError::InvalidMerkleRoot);
        }

        match self.header.hash() {
            Some(hash) if hash != self.header.compute_hash() => Err(BlockError::InvalidHash),
            _ => Ok(()),
        }
    }
}

/// Merkle root over transaction hashes, duplicating the last hash on odd levels
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return Hash256::ZERO;
    }

    let mut level: Vec<Hash256> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(&left.0);
                combined[32..].copy_from_slice(&right.0);
                Hash256::digest(&combined)
            })
            .collect();
    }

    level[0]
}
