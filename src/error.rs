//! Error types for the IPAM plugin.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, Error>;

/// CNI error code: incompatible CNI version
pub const CODE_INCOMPATIBLE_VERSION: u32 = 1;
/// CNI error code: invalid necessary environment variables
pub const CODE_INVALID_ENVIRONMENT: u32 = 4;
/// CNI error code: I/O failure
pub const CODE_IO_FAILURE: u32 = 5;
/// CNI error code: failed to decode content
pub const CODE_DECODING_FAILURE: u32 = 6;
/// CNI error code: invalid network config
pub const CODE_INVALID_NETWORK_CONFIG: u32 = 7;
/// CNI error code: try again later
pub const CODE_TRY_AGAIN_LATER: u32 = 11;
/// First plugin-specific CNI error code
pub const CODE_PLUGIN_SPECIFIC: u32 = 100;

/// Errors reported by the inventory collaborator
#[derive(Error, Debug)]
pub enum InventoryError {
    /// No address can be allocated at the requested slot
    #[error("no address available at interface index {0}")]
    Exhausted(u32),

    /// The remote allocation call failed
    #[error("inventory request '{operation}' failed: {reason}")]
    Remote { operation: String, reason: String },

    /// The inventory answered with something we could not decode
    #[error("inventory response for '{operation}' could not be decoded: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// The inventory helper could not be started
    #[error("failed to run inventory helper '{helper}': {source}")]
    Spawn {
        helper: String,
        #[source]
        source: std::io::Error,
    },
}

/// Core error type for the plugin
#[derive(Error, Debug)]
pub enum Error {
    /// The network configuration did not decode
    #[error("failed to parse network configuration: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// The network configuration decoded but is missing required content
    #[error("invalid network configuration: {0}")]
    Config(String),

    /// The invocation environment is missing or malformed
    #[error("invalid plugin environment: {0}")]
    Environment(#[source] clap::Error),

    /// The requested CNI version is not one we can speak
    #[error("unsupported CNI version {0}")]
    UnsupportedVersion(String),

    /// No address could be obtained by any acquisition step
    #[error("unable to acquire an address at interface index {index}: {source}")]
    Acquisition {
        index: u32,
        #[source]
        source: InventoryError,
    },

    /// A freshly created interface does not carry exactly one address
    #[error("new interface {interface} carries {count} IPv4 addresses, expected exactly one")]
    InconsistentInterface { interface: String, count: usize },

    /// The chosen device could not be brought up
    #[error("unable to bring up interface {device}: {reason}")]
    Activation { device: String, reason: String },

    /// A CIDR is too narrow for the fixed gateway/DNS offsets
    #[error("addressing convention does not hold for {cidr}: {reason}")]
    Addressing { cidr: String, reason: String },

    /// The target namespace could not be entered or inspected
    #[error("network namespace {path}: {reason}")]
    Namespace { path: String, reason: String },

    /// Listing addresses on a device failed
    #[error("unable to list addresses on {device}: {reason}")]
    Link { device: String, reason: String },

    /// Returning an address to the inventory failed
    #[error("failed to release address {ip}: {source}")]
    Release {
        ip: Ipv4Addr,
        #[source]
        source: InventoryError,
    },

    /// The result document could not be encoded
    #[error("failed to encode result for CNI version {version}: {reason}")]
    Serialization { version: String, reason: String },

    /// The host-wide execution lock could not be taken
    #[error("execution lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an activation error for a device
    pub fn activation(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::Activation {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a namespace error for a namespace path
    pub fn namespace(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Namespace {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Map this error onto the CNI error code reported to the runtime
    pub fn cni_code(&self) -> u32 {
        match self {
            Self::ConfigParse(_) => CODE_DECODING_FAILURE,
            Self::Config(_) => CODE_INVALID_NETWORK_CONFIG,
            Self::Environment(_) => CODE_INVALID_ENVIRONMENT,
            Self::UnsupportedVersion(_) => CODE_INCOMPATIBLE_VERSION,
            Self::Acquisition {
                source: InventoryError::Exhausted(_),
                ..
            } => CODE_TRY_AGAIN_LATER,
            Self::Lock { .. } => CODE_IO_FAILURE,
            _ => CODE_PLUGIN_SPECIFIC,
        }
    }
}
