//! IPAM CNI plugin for secondary cloud-interface addresses
//!
//! This implementation provides a pure Rust IPAM plugin that:
//! - Hands a secondary address of a cloud network interface to a container on ADD
//! - Reuses orphaned addresses before allocating, and attaches new interfaces last
//! - Derives gateway, resolver and routes from the VPC addressing conventions
//! - Returns the container's addresses to the inventory on DEL
//! - Serializes every invocation on a host behind one lock

pub mod addressing;
pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod link;
pub mod lock;
pub mod netns;
pub mod plugin;
pub mod types;

// Re-export commonly used items
pub use commands::{execute, run_cni, Command};
pub use config::{IpamConfig, PluginConfig, RuntimeSettings};
pub use error::{Error, Result};
pub use plugin::IpamPlugin;
