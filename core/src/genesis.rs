//! Deterministic genesis block
//!
//! The genesis hash is the gate for the first persisted header, and the two
//! register transactions it carries define the governing and utility asset ids.

use crate::asset::AssetType;
use crate::block::Block;
use crate::transaction::{Transaction, TransactionKind, TransactionOutput};
use crate::types::{Fixed8, Hash160, Hash256};

const GENESIS_TIMESTAMP: u32 = 1_468_595_301;
const GENESIS_NONCE: u32 = 2_083_236_893;
const GENESIS_CONSENSUS_DATA: u64 = 2_083_236_893;
const TOKEN_SUPPLY: Fixed8 = Fixed8(100_000_000 * Fixed8::ONE.0);

/// Builds the genesis block and exposes the native asset ids
#[derive(Debug, Clone)]
pub struct GenesisBuilder {
    genesis: Block,
    governing_token: Hash256,
    utility_token: Hash256,
}

impl GenesisBuilder {
    pub fn new() -> Self {
        let mut governing = Transaction::new(TransactionKind::Register {
            asset_type: AssetType::GoverningToken,
            name: "Strata".to_string(),
            amount: TOKEN_SUPPLY,
            precision: 0,
            admin: Hash160::ZERO,
        });
        let mut utility = Transaction::new(TransactionKind::Register {
            asset_type: AssetType::UtilityToken,
            name: "StrataGas".to_string(),
            amount: TOKEN_SUPPLY,
            precision: 8,
            admin: Hash160::ZERO,
        });
        let governing_token = governing.sign();
        let utility_token = utility.sign();

        let issue = Transaction::new(TransactionKind::Issue).with_outputs(vec![TransactionOutput {
            asset_id: governing_token,
            value: TOKEN_SUPPLY,
            script_hash: Hash160::ZERO,
        }]);

        let mut genesis = Block::new(
            0,
            Hash256::ZERO,
            GENESIS_TIMESTAMP,
            GENESIS_CONSENSUS_DATA,
            vec![
                Transaction::new(TransactionKind::Miner {
                    nonce: GENESIS_NONCE,
                }),
                governing,
                utility,
                issue,
            ],
        );
        genesis.sign();

        GenesisBuilder {
            genesis,
            governing_token,
            utility_token,
        }
    }

    pub fn build(&self) -> Block {
        self.genesis.clone()
    }

    pub fn hash(&self) -> Hash256 {
        // `new` signs the block, so the hash is always present
        self.genesis.hash().unwrap_or_else(|| self.genesis.header.compute_hash())
    }

    pub fn governing_token(&self) -> Hash256 {
        self.governing_token
    }

    pub fn utility_token(&self) -> Hash256 {
        self.utility_token
    }
}

impl Default for GenesisBuilder {
    fn default() -> Self {
        Self::new()
    }
}
