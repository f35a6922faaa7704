use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the execution lock path
pub const ENV_LOCK_PATH: &str = "ENI_IPAM_LOCK_PATH";
/// Environment variable overriding the inventory helper executable
pub const ENV_INVENTORY_HELPER: &str = "ENI_IPAM_INVENTORY_HELPER";
/// Environment variable overriding the number of link-up polls
pub const ENV_LINK_POLL_ATTEMPTS: &str = "ENI_IPAM_LINK_POLL_ATTEMPTS";
/// Environment variable overriding the pause between link-up polls
pub const ENV_LINK_POLL_INTERVAL_MS: &str = "ENI_IPAM_LINK_POLL_INTERVAL_MS";

const DEFAULT_LOCK_PATH: &str = "/run/eni-ipam.lock";
const DEFAULT_INVENTORY_HELPER: &str = "eni-inventory";
const DEFAULT_LINK_POLL_ATTEMPTS: u32 = 10;

/// Network configuration handed to the plugin on stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Name of the network
    #[serde(default)]
    pub name: String,
    /// CNI specification version the result must be encoded in
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,
    /// IPAM configuration
    pub ipam: IpamConfig,
}

/// IPAM (IP Address Management) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
    /// Security groups applied to any interface created on our behalf
    pub sec_group_ids: Vec<String>,
    /// Tags a subnet must carry to host a new interface
    #[serde(default)]
    pub subnet_tags: BTreeMap<String, String>,
    /// Interface slot addresses are taken from
    #[serde(default)]
    pub interface_index: u32,
    /// Keep addresses allocated when the container goes away
    #[serde(default)]
    pub skip_deallocation: bool,
}

/// Wire shape of the configuration before the required sections are checked.
///
/// `Option` distinguishes a missing (or `null`) key from an empty one.
#[derive(Debug, Deserialize)]
struct RawPluginConfig {
    #[serde(default)]
    name: String,
    // An absent version is left for the version check to reject
    #[serde(rename = "cniVersion", default)]
    cni_version: String,
    #[serde(default)]
    ipam: Option<RawIpamConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIpamConfig {
    #[serde(default)]
    sec_group_ids: Option<Vec<String>>,
    #[serde(default)]
    subnet_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    interface_index: u32,
    #[serde(default)]
    skip_deallocation: bool,
}

impl PluginConfig {
    /// Parse PluginConfig from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawPluginConfig = serde_json::from_slice(bytes).map_err(Error::ConfigParse)?;

        let ipam = raw
            .ipam
            .ok_or_else(|| Error::config("IPAM config missing 'ipam' key"))?;

        // An empty list is a valid choice, an absent one is not
        let sec_group_ids = ipam
            .sec_group_ids
            .ok_or_else(|| Error::config("secGroupIds must be specified"))?;

        Ok(Self {
            name: raw.name,
            cni_version: raw.cni_version,
            ipam: IpamConfig {
                sec_group_ids,
                subnet_tags: ipam.subnet_tags.unwrap_or_default(),
                interface_index: ipam.interface_index,
                skip_deallocation: ipam.skip_deallocation,
            },
        })
    }
}

/// Host-level settings for the plugin process, taken from the environment
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RuntimeSettings {
    /// Lock file shared by every invocation on this host
    #[clap(long, env = ENV_LOCK_PATH, default_value = DEFAULT_LOCK_PATH)]
    pub lock_path: PathBuf,

    /// Executable answering inventory requests
    #[clap(long, env = ENV_INVENTORY_HELPER, default_value = DEFAULT_INVENTORY_HELPER)]
    pub inventory_helper: PathBuf,

    /// How many times to try bringing a link up
    #[clap(
        long,
        env = ENV_LINK_POLL_ATTEMPTS,
        default_value_t = DEFAULT_LINK_POLL_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub link_poll_attempts: u32,

    /// Pause between link-up attempts, in milliseconds
    #[clap(
        long = "link-poll-interval-ms",
        env = ENV_LINK_POLL_INTERVAL_MS,
        default_value = "500",
        value_parser = parse_millis
    )]
    pub link_poll_interval: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            inventory_helper: PathBuf::from(DEFAULT_INVENTORY_HELPER),
            link_poll_attempts: DEFAULT_LINK_POLL_ATTEMPTS,
            link_poll_interval: Duration::from_millis(500),
        }
    }
}

fn parse_millis(value: &str) -> std::result::Result<Duration, ParseIntError> {
    value.trim().parse().map(Duration::from_millis)
}
