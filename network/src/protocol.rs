//! Handshake state shared by the server and the version handler

use crate::config::NetworkConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use strata_core::{Block, ChainContext, VersionPayload, PROTOCOL_VERSION};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ServerContext {
    magic: u32,
    port: u16,
    user_agent: String,
    /// Identifies this process so a dial back to ourselves is refused
    nonce: u32,
    current_height: AtomicU32,
}

impl ServerContext {
    /// Starts advertising the chain's current height; build it once the
    /// block processor holds the recovered tip.
    pub fn new(config: &NetworkConfig, chain: &ChainContext) -> Self {
        ServerContext {
            magic: config.magic,
            port: config.listen.port(),
            user_agent: config.user_agent.clone(),
            nonce: rand::random(),
            current_height: AtomicU32::new(chain.current_height().unwrap_or(0)),
        }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn current_height(&self) -> u32 {
        self.current_height.load(Ordering::Acquire)
    }

    pub fn set_current_height(&self, height: u32) {
        self.current_height.fetch_max(height, Ordering::AcqRel);
    }

    pub fn version_payload(&self) -> VersionPayload {
        VersionPayload {
            version: PROTOCOL_VERSION,
            magic: self.magic,
            timestamp: chrono::Utc::now().timestamp().max(0) as u32,
            port: self.port,
            nonce: self.nonce,
            user_agent: self.user_agent.clone(),
            current_block_index: self.current_height(),
            relay: true,
        }
    }

    pub fn validate_version(&self, payload: &VersionPayload) -> Result<(), String> {
        if payload.magic != self.magic {
            return Err(format!(
                "Network mismatch: expected {:#x}, got {:#x}",
                self.magic, payload.magic
            ));
        }

        if payload.version != PROTOCOL_VERSION {
            return Err(format!(
                "Protocol version mismatch: expected {}, got {}",
                PROTOCOL_VERSION, payload.version
            ));
        }

        if payload.nonce == self.nonce {
            return Err("Connected to self".to_string());
        }

        Ok(())
    }

    /// Keep the advertised height in step with processed blocks
    pub fn track_height(
        self: &Arc<Self>,
        mut processed: broadcast::Receiver<Block>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let context = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = processed.recv() => match event {
                        Ok(block) => context.set_current_height(block.index()),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "height tracker lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
