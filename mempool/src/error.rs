use strata_core::{CoinReference, Hash256, RepositoryError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("Mempool is full ({0} transactions)")]
    MempoolFull(usize),
}

/// Why a transaction failed verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("reserved attribute usage")]
    ReservedAttribute,

    #[error("duplicate input {}:{}", .0.prev_hash.short(), .0.prev_index)]
    DuplicateInput(CoinReference),

    #[error("inputs already spent")]
    DoubleSpend,

    #[error("unknown asset {0}")]
    UnknownAsset(Hash256),

    #[error("asset {0} is not transferable")]
    NonTransferable(Hash256),

    #[error("negative output value")]
    NegativeOutput,

    #[error("output value exceeds precision of asset {0}")]
    PrecisionExceeded(Hash256),

    #[error("unresolved reference {}:{}", .0.prev_hash.short(), .0.prev_index)]
    UnresolvedReference(CoinReference),

    #[error("amount overflow")]
    Overflow,

    #[error("more than one asset destroyed")]
    MultipleDestroyed,

    #[error("destroyed asset {0} is not the utility token")]
    DestroyedNotUtility(Hash256),

    #[error("zero reference amount for a required system fee")]
    ZeroReferenceAmount,

    #[error("reference amount below system fee")]
    InsufficientFee,

    #[error("claim produces a negative utility result")]
    NegativeClaim,

    #[error("asset {0} may not be issued by this transaction")]
    IllegalIssue(Hash256),

    #[error("witness {0} failed verification")]
    InvalidWitness(usize),

    #[error("chain query failed: {0}")]
    Query(#[from] RepositoryError),
}
