//! Logical peer messages
//!
//! Framing and byte layout live in the network crate; this module only
//! defines the message shapes the pipeline exchanges.

use crate::block::Block;
use crate::transaction::Transaction;
use crate::types::Hash256;
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Handshake payload sent on every new connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPayload {
    pub version: u32,
    /// Network identifier; peers on another network are refused
    pub magic: u32,
    pub timestamp: u32,
    pub port: u16,
    /// Random per-process value used to detect connections to ourselves
    pub nonce: u32,
    pub user_agent: String,
    /// Height of the sender's current block
    pub current_block_index: u32,
    pub relay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlocksPayload {
    /// Zero or one starting hash; empty means "from genesis"
    pub hash_start: Vec<Hash256>,
    /// Zero means "no stop"
    pub hash_stop: Hash256,
}

impl GetBlocksPayload {
    pub fn new(hash_start: Option<Hash256>) -> Self {
        GetBlocksPayload {
            hash_start: hash_start.into_iter().collect(),
            hash_stop: Hash256::ZERO,
        }
    }

    pub fn start(&self) -> Option<Hash256> {
        self.hash_start.first().copied()
    }

    pub fn stop(&self) -> Option<Hash256> {
        if self.hash_stop.is_zero() {
            None
        } else {
            Some(self.hash_stop)
        }
    }
}

/// Network message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Version(VersionPayload),
    VerAck,
    GetBlocks(GetBlocksPayload),
    Block(Block),
    Transaction(Transaction),
}

impl Message {
    pub fn get_blocks(hash_start: Option<Hash256>) -> Self {
        Message::GetBlocks(GetBlocksPayload::new(hash_start))
    }

    /// Version and VerAck are the only messages exchanged before a peer is ready
    pub fn is_handshake(&self) -> bool {
        matches!(self, Message::Version(_) | Message::VerAck)
    }

    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::VerAck => "verack",
            Message::GetBlocks(_) => "getblocks",
            Message::Block(_) => "block",
            Message::Transaction(_) => "tx",
        }
    }
}
