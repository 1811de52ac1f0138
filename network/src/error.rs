use std::net::SocketAddr;
use strata_core::ChainError;
use strata_mempool::MempoolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Wrong network magic {0:#x}")]
    WrongMagic(u32),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Access denied for {0}")]
    AccessDenied(SocketAddr),

    #[error("Server is {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

impl NetworkError {
    /// Errors after which the connection cannot be trusted any more
    pub fn is_fatal_to_peer(&self) -> bool {
        matches!(
            self,
            NetworkError::Io(_)
                | NetworkError::FrameTooLarge { .. }
                | NetworkError::WrongMagic(_)
                | NetworkError::Codec(_)
                | NetworkError::Disconnected
                | NetworkError::HandshakeFailed(_)
        )
    }
}
