use crate::acl::AclConfig;
use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_MAGIC: u32 = 7_630_401;
pub const DEFAULT_PORT: u16 = 20333;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen: SocketAddr,
    /// Peers dialed at start-up
    pub seeds: Vec<SocketAddr>,
    pub magic: u32,
    /// Pause between two reads from the same peer
    pub receive_interval_ms: u64,
    pub max_frame_bytes: usize,
    pub user_agent: String,
    pub acl: AclConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            seeds: Vec::new(),
            magic: DEFAULT_MAGIC,
            receive_interval_ms: 50,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            user_agent: format!("/strata:{}/", env!("CARGO_PKG_VERSION")),
            acl: AclConfig::default(),
        }
    }
}

impl NetworkConfig {
    pub fn receive_interval(&self) -> Duration {
        Duration::from_millis(self.receive_interval_ms)
    }
}
