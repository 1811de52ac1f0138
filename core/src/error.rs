//! Chain error types
//!
//! Structural failures surface as `ChainError`; validation outcomes are plain
//! booleans and never reach this enum.

use crate::block::BlockError;
use crate::types::Hash256;
use thiserror::Error;

/// Failures reported by a durable repository or chain query backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Block hash is zero")]
    ZeroHash,

    #[error("Block {0} is already queued")]
    AlreadyQueued(Hash256),

    #[error("Block pool is full ({0} blocks)")]
    PoolFull(usize),

    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),

    #[error("Block processor is already running")]
    AlreadyRunning,

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub type ChainResult<T> = Result<T, ChainError>;
