//! Chain constants the verifier needs: native asset ids and system fees

use serde::{Deserialize, Serialize};
use strata_core::{Fixed8, GenesisBuilder, Hash256, Transaction, TransactionKind};

/// System fees per transaction kind, in whole utility tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub enrollment: i64,
    pub register: i64,
    pub issue: i64,
    pub publish: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            enrollment: 1000,
            register: 10000,
            issue: 500,
            publish: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub governing_token: Hash256,
    pub utility_token: Hash256,
    pub fees: FeeSchedule,
}

impl TransactionContext {
    pub fn new(governing_token: Hash256, utility_token: Hash256, fees: FeeSchedule) -> Self {
        TransactionContext {
            governing_token,
            utility_token,
            fees,
        }
    }

    /// Context for the chain rooted at the built-in genesis block
    pub fn from_genesis(genesis: &GenesisBuilder, fees: FeeSchedule) -> Self {
        Self::new(genesis.governing_token(), genesis.utility_token(), fees)
    }

    /// Utility tokens the transaction must destroy
    pub fn system_fee(&self, tx: &Transaction) -> Fixed8 {
        let units = match &tx.kind {
            TransactionKind::Enrollment { .. } => self.fees.enrollment,
            TransactionKind::Register { .. } => self.fees.register,
            TransactionKind::Publish { .. } => self.fees.publish,
            TransactionKind::Issue => {
                // Issuing the native tokens is free
                let native_only = tx
                    .outputs
                    .iter()
                    .all(|o| o.asset_id == self.governing_token || o.asset_id == self.utility_token);
                if native_only {
                    0
                } else {
                    self.fees.issue
                }
            }
            TransactionKind::Invocation { gas, .. } => return *gas,
            TransactionKind::Miner { .. } | TransactionKind::Claim { .. } | TransactionKind::Contract => 0,
        };
        Fixed8::from_units(units).unwrap_or(Fixed8::MAX)
    }
}
