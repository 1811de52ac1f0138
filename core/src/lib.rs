//! Strata Core Library
//!
//! Chain types and the block synchronization pipeline: the out-of-order
//! block pool, the sequential header/block persisters and the block
//! processor that drains one into the other.

pub mod asset;
pub mod block;
pub mod block_pool;
pub mod broadcast;
pub mod context;
pub mod error;
pub mod genesis;
pub mod message;
pub mod persister;
pub mod processor;
pub mod repository;
pub mod transaction;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main types
pub use asset::{Asset, AssetType};
pub use block::{Block, BlockError, BlockHeader, HeaderType};
pub use block_pool::BlockPool;
pub use broadcast::{Broadcaster, PeerId};
pub use context::ChainContext;
pub use error::{ChainError, ChainResult, RepositoryError};
pub use genesis::GenesisBuilder;
pub use message::{GetBlocksPayload, Message, VersionPayload, PROTOCOL_VERSION};
pub use persister::{BlockPersister, HeaderPersister};
pub use processor::{AddBlockOutcome, BlockProcessor, ProcessorConfig};
pub use repository::{ChainQuery, Repository, RepositoryResult};
pub use transaction::{
    AttributeUsage, CoinReference, Transaction, TransactionAttribute, TransactionKind,
    TransactionOutput, Witness,
};
pub use types::{Fixed8, Hash160, Hash256, ParseError};
