//! Strata Storage Layer
//!
//! Durable chain repository over a pluggable key-value backend:
//! - `SledStore` for nodes that keep their chain across restarts
//! - `MemoryStore` for tests and throwaway nodes
//!
//! Records are bincode-encoded. Each repository write is one atomic batch.

pub mod backend;
pub mod repository;

pub use backend::{KeyValueStore, MemoryStore, SledStore, WriteBatch};
pub use repository::ChainRepository;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::RepositoryError;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SerializationError(msg) => RepositoryError::Serialization(msg),
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sled,
            path: PathBuf::from("data/chain"),
        }
    }
}

impl StorageConfig {
    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        match self.backend {
            StorageBackend::Sled => {
                std::fs::create_dir_all(&self.path)?;
                info!(path = %self.path.display(), "opening sled store");
                Ok(Arc::new(SledStore::open(&self.path)?))
            }
            StorageBackend::Memory => {
                info!("using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}
