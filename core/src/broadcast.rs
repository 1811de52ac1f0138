//! Outbound fan-out seam between the pipeline and the peer layer

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-local identifier of a connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Sends a message to every handshake-ready peer except `exclude`.
///
/// Implementations must not block the caller on network I/O.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: Message, exclude: Option<PeerId>);
}
