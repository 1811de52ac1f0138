//! Per-address access control for connected peers

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclMode {
    #[default]
    Disabled,
    /// Only listed addresses may connect
    Whitelist,
    /// Listed addresses are refused
    Blacklist,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub mode: AclMode,
    pub entries: Vec<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct NetworkAcl {
    mode: AclMode,
    entries: HashSet<IpAddr>,
}

impl NetworkAcl {
    pub fn new(config: &AclConfig) -> Self {
        NetworkAcl {
            mode: config.mode,
            entries: config.entries.iter().copied().collect(),
        }
    }

    pub fn is_allowed(&self, addr: &IpAddr) -> bool {
        match self.mode {
            AclMode::Disabled => true,
            AclMode::Whitelist => self.entries.contains(addr),
            AclMode::Blacklist => !self.entries.contains(addr),
        }
    }
}
