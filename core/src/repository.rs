//! Storage seams
//!
//! `Repository` is the durable append side used by the persisters;
//! `ChainQuery` is the read-only view used by the verifier and handlers.

use crate::asset::Asset;
use crate::block::{Block, BlockHeader};
use crate::error::RepositoryError;
use crate::transaction::{CoinReference, Transaction, TransactionOutput};
use crate::types::Hash256;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable, append-oriented chain storage.
///
/// A header append and the following height write are two separate calls;
/// implementations must make each one atomic on its own so that recovery can
/// roll forward from the last recorded height. `add_block` may record the
/// block height in the same write as the body.
pub trait Repository: Send + Sync {
    fn add_block_header(&self, header: &BlockHeader) -> RepositoryResult<()>;

    fn set_total_block_header_height(&self, height: u32) -> RepositoryResult<()>;

    fn total_block_header_height(&self) -> RepositoryResult<Option<u32>>;

    fn block_header(&self, height: u32) -> RepositoryResult<Option<BlockHeader>>;

    /// Store a block body: transactions, spent markers and registered assets
    fn add_block(&self, block: &Block) -> RepositoryResult<()>;

    fn set_total_block_height(&self, height: u32) -> RepositoryResult<()>;

    fn total_block_height(&self) -> RepositoryResult<Option<u32>>;

    fn block(&self, height: u32) -> RepositoryResult<Option<Block>>;

    fn block_height_by_hash(&self, hash: &Hash256) -> RepositoryResult<Option<u32>>;
}

/// Read-only chain state
pub trait ChainQuery: Send + Sync {
    fn asset(&self, id: &Hash256) -> RepositoryResult<Option<Asset>>;

    fn transaction(&self, hash: &Hash256) -> RepositoryResult<Option<Transaction>>;

    fn contains_transaction(&self, hash: &Hash256) -> RepositoryResult<bool> {
        Ok(self.transaction(hash)?.is_some())
    }

    /// True when any input of `tx` is already spent on chain
    fn is_double_spend(&self, tx: &Transaction) -> RepositoryResult<bool>;

    fn unspent_output(&self, reference: &CoinReference) -> RepositoryResult<Option<TransactionOutput>>;

    fn current_block_height(&self) -> RepositoryResult<Option<u32>>;

    fn current_block_hash(&self) -> RepositoryResult<Option<Hash256>>;
}
