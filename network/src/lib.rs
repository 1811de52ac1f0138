//! Strata Network Module
//!
//! Peer-to-peer layer of the node: framed TCP transport, the connected peer
//! set, message handlers, and the server that ties them together.
pub mod acl;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod peer;
pub mod protocol;
pub mod server;

#[cfg(test)]
pub(crate) mod test_utils;

pub use acl::{AclConfig, AclMode, NetworkAcl};
pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_BYTES};
pub use config::{NetworkConfig, DEFAULT_MAGIC, DEFAULT_PORT};
pub use error::NetworkError;
pub use handlers::{
    BlockMessageHandler, GetBlocksMessageHandler, MessageDispatcher, MessageHandler, TransactionMessageHandler,
    VerAckMessageHandler, VersionMessageHandler,
};
pub use manager::PeerManager;
pub use peer::{Peer, PeerListener, TcpPeer};
pub use protocol::ServerContext;
pub use server::{PeerEvent, Server, ServerState};
