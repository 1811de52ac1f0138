//! Strata node binary support: configuration and node assembly
pub mod config;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use node::Node;
