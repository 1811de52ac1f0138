//! Transaction verifier
//!
//! Reads chain state through `ChainQuery` and never writes to it. Checks
//! run in a fixed order and stop at the first failure.

use crate::context::TransactionContext;
use crate::error::Rejection;
use crate::witness::WitnessVerifier;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use strata_core::{AssetType, ChainQuery, Fixed8, Hash256, Transaction, TransactionKind};
use tracing::{debug, warn};

pub struct TransactionVerifier {
    chain: Arc<dyn ChainQuery>,
    context: TransactionContext,
    witnesses: Arc<dyn WitnessVerifier>,
}

impl TransactionVerifier {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        context: TransactionContext,
        witnesses: Arc<dyn WitnessVerifier>,
    ) -> Self {
        TransactionVerifier {
            chain,
            context,
            witnesses,
        }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn verify(&self, tx: &Transaction) -> bool {
        match self.check(tx) {
            Ok(()) => true,
            Err(Rejection::Query(e)) => {
                warn!(tx = %tx_label(tx), error = %e, "chain query failed during verification");
                false
            }
            Err(reason) => {
                debug!(tx = %tx_label(tx), kind = tx.kind.name(), %reason, "transaction rejected");
                false
            }
        }
    }

    /// Run every rule, reporting the first one that fails
    pub fn check(&self, tx: &Transaction) -> Result<(), Rejection> {
        if tx.attributes.iter().any(|a| a.usage.is_reserved()) {
            return Err(Rejection::ReservedAttribute);
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !seen.insert(*input) {
                return Err(Rejection::DuplicateInput(*input));
            }
        }

        if self.chain.is_double_spend(tx)? {
            return Err(Rejection::DoubleSpend);
        }

        self.check_outputs(tx)?;

        let results = self.results(tx)?;
        self.check_destroyed(tx, &results)?;
        self.check_issued(tx, &results)?;

        let hash = tx.hash().unwrap_or_else(|| tx.compute_hash());
        for (index, witness) in tx.witnesses.iter().enumerate() {
            if !self.witnesses.verify(&hash, witness) {
                return Err(Rejection::InvalidWitness(index));
            }
        }

        Ok(())
    }

    /// Asset existence, transferability, sign and precision of every output
    fn check_outputs(&self, tx: &Transaction) -> Result<(), Rejection> {
        let mut by_asset: BTreeMap<Hash256, Vec<Fixed8>> = BTreeMap::new();
        for output in &tx.outputs {
            by_asset.entry(output.asset_id).or_default().push(output.value);
        }

        for (asset_id, values) in by_asset {
            let asset = self
                .chain
                .asset(&asset_id)?
                .ok_or(Rejection::UnknownAsset(asset_id))?;
            if asset.asset_type.is_duty_flag() {
                return Err(Rejection::NonTransferable(asset_id));
            }

            let precision = match asset.asset_type {
                AssetType::GoverningToken => 0,
                _ => asset.precision,
            };
            for value in values {
                if value.is_negative() {
                    return Err(Rejection::NegativeOutput);
                }
                if !value.fits_precision(precision) {
                    return Err(Rejection::PrecisionExceeded(asset_id));
                }
            }
        }
        Ok(())
    }

    /// Referenced minus output amounts per asset, zero entries dropped
    fn results(&self, tx: &Transaction) -> Result<BTreeMap<Hash256, Fixed8>, Rejection> {
        let mut results: BTreeMap<Hash256, Fixed8> = BTreeMap::new();

        for input in &tx.inputs {
            let output = self
                .chain
                .transaction(&input.prev_hash)?
                .and_then(|prev| prev.outputs.get(input.prev_index as usize).cloned())
                .ok_or(Rejection::UnresolvedReference(*input))?;
            let entry = results.entry(output.asset_id).or_insert(Fixed8::ZERO);
            *entry = entry.checked_add(output.value).ok_or(Rejection::Overflow)?;
        }

        for output in &tx.outputs {
            let entry = results.entry(output.asset_id).or_insert(Fixed8::ZERO);
            *entry = entry.checked_sub(output.value).ok_or(Rejection::Overflow)?;
        }

        results.retain(|_, amount| *amount != Fixed8::ZERO);
        Ok(results)
    }

    fn check_destroyed(&self, tx: &Transaction, results: &BTreeMap<Hash256, Fixed8>) -> Result<(), Rejection> {
        let destroyed: Vec<(&Hash256, &Fixed8)> = results.iter().filter(|(_, v)| v.is_positive()).collect();
        if destroyed.len() > 1 {
            return Err(Rejection::MultipleDestroyed);
        }
        if let Some((asset_id, _)) = destroyed.first() {
            if **asset_id != self.context.utility_token {
                return Err(Rejection::DestroyedNotUtility(**asset_id));
            }
        }

        let fee = self.context.system_fee(tx);
        if fee.is_positive() {
            let paid = destroyed.first().map(|(_, amount)| **amount).unwrap_or(Fixed8::ZERO);
            if paid == Fixed8::ZERO {
                return Err(Rejection::ZeroReferenceAmount);
            }
            if paid < fee {
                return Err(Rejection::InsufficientFee);
            }
        }
        Ok(())
    }

    fn check_issued(&self, tx: &Transaction, results: &BTreeMap<Hash256, Fixed8>) -> Result<(), Rejection> {
        let utility = self.context.utility_token;
        for (asset_id, _) in results.iter().filter(|(_, v)| v.is_negative()) {
            match tx.kind {
                TransactionKind::Miner { .. } if *asset_id == utility => {}
                TransactionKind::Claim { .. } if *asset_id == utility => {
                    return Err(Rejection::NegativeClaim);
                }
                TransactionKind::Issue if *asset_id != utility => {}
                _ => return Err(Rejection::IllegalIssue(*asset_id)),
            }
        }
        Ok(())
    }
}

fn tx_label(tx: &Transaction) -> String {
    tx.hash().map(|h| h.short()).unwrap_or_else(|| "unsigned".to_string())
}
