use std::net::Ipv4Addr;
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use ipnetwork::Ipv4Network;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// An address found bound to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceAddress {
    /// Address with its prefix length
    pub network: Ipv4Network,
}

impl NamespaceAddress {
    /// The bare address
    pub fn ip(&self) -> Ipv4Addr {
        self.network.ip()
    }
}

/// Link-level operations on network devices
pub trait LinkControl: Send + Sync {
    /// Set `device` up, retrying until it reports up or attempts run out
    fn bring_up_and_poll(&self, device: &str) -> Result<()>;

    /// IPv4 addresses bound to `device` in the current namespace
    fn ipv4_addresses(&self, device: &str) -> Result<Vec<NamespaceAddress>>;
}

impl<T: LinkControl + ?Sized> LinkControl for &T {
    fn bring_up_and_poll(&self, device: &str) -> Result<()> {
        (**self).bring_up_and_poll(device)
    }

    fn ipv4_addresses(&self, device: &str) -> Result<Vec<NamespaceAddress>> {
        (**self).ipv4_addresses(device)
    }
}

/// Link control implemented with the `ip` tool
#[derive(Debug, Clone)]
pub struct IpCommandLink {
    attempts: u32,
    interval: Duration,
}

impl IpCommandLink {
    /// Create a link controller polling `attempts` times, `interval` apart
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    fn set_up(&self, device: &str) -> AnyResult<()> {
        let up_cmd = Command::new("ip")
            .args(["link", "set", "dev", device, "up"])
            .output()
            .context("Failed to execute ip link set up command")?;

        if !up_cmd.status.success() {
            anyhow::bail!("{}", String::from_utf8_lossy(&up_cmd.stderr).trim());
        }

        let show_cmd = Command::new("ip")
            .args(["-j", "link", "show", "dev", device])
            .output()
            .context("Failed to execute ip -j link show command")?;

        if !show_cmd.status.success() {
            anyhow::bail!("{}", String::from_utf8_lossy(&show_cmd.stderr).trim());
        }

        if !link_is_up(&show_cmd.stdout)? {
            anyhow::bail!("link {} is not up yet", device);
        }

        Ok(())
    }
}

impl LinkControl for IpCommandLink {
    fn bring_up_and_poll(&self, device: &str) -> Result<()> {
        if device.is_empty() {
            return Err(Error::activation(device, "interface has no local device name"));
        }

        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match self.set_up(device) {
                Ok(()) => {
                    info!(device, attempt, "interface is up");
                    return Ok(());
                }
                Err(e) => {
                    debug!(device, attempt, error = %e, "interface not up yet");
                    last_err = Some(e);
                }
            }
            if attempt < self.attempts {
                thread::sleep(self.interval);
            }
        }

        let reason = last_err
            .map(|e| format!("{:#}", e))
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(Error::activation(
            device,
            format!("gave up after {} attempts: {}", self.attempts, reason),
        ))
    }

    fn ipv4_addresses(&self, device: &str) -> Result<Vec<NamespaceAddress>> {
        let addr_cmd = Command::new("ip")
            .args(["-j", "-4", "addr", "show", "dev", device])
            .output()
            .map_err(|e| Error::Link {
                device: device.to_string(),
                reason: e.to_string(),
            })?;

        if !addr_cmd.status.success() {
            return Err(Error::Link {
                device: device.to_string(),
                reason: String::from_utf8_lossy(&addr_cmd.stderr).trim().to_string(),
            });
        }

        parse_addresses(&addr_cmd.stdout).map_err(|e| Error::Link {
            device: device.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

/// One entry of `ip -j link show` / `ip -j addr show`
#[derive(Debug, Deserialize)]
struct IpLinkJson {
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    addr_info: Vec<IpAddrInfoJson>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfoJson {
    family: String,
    local: String,
    prefixlen: u8,
}

fn link_is_up(stdout: &[u8]) -> AnyResult<bool> {
    let links: Vec<IpLinkJson> =
        serde_json::from_slice(stdout).context("Failed to decode ip link output")?;

    // Virtual devices without a carrier report UNKNOWN while administratively up
    Ok(links.iter().any(|link| {
        link.flags.iter().any(|f| f == "UP")
            && !matches!(link.operstate.as_deref(), Some("DOWN"))
    }))
}

fn parse_addresses(stdout: &[u8]) -> AnyResult<Vec<NamespaceAddress>> {
    let links: Vec<IpLinkJson> =
        serde_json::from_slice(stdout).context("Failed to decode ip addr output")?;

    let mut addrs = Vec::new();
    for info in links.iter().flat_map(|link| link.addr_info.iter()) {
        if info.family != "inet" {
            continue;
        }
        let ip: Ipv4Addr = info
            .local
            .parse()
            .with_context(|| format!("Invalid address '{}'", info.local))?;
        let network = Ipv4Network::new(ip, info.prefixlen)
            .with_context(|| format!("Invalid prefix length {}", info.prefixlen))?;
        addrs.push(NamespaceAddress { network });
    }

    Ok(addrs)
}
