use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// CNI versions whose result layout we can produce
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Version reported by the VERSION command
pub const CURRENT_VERSION: &str = "1.0.0";

/// Whether `version` is one of [`SUPPORTED_VERSIONS`]
pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

/// CNI command arguments
#[derive(Debug, Clone)]
pub struct CmdArgs {
    /// Container ID
    pub container_id: String,
    /// Network namespace path
    pub netns: String,
    /// Interface name
    pub ifname: String,
    /// Arguments
    pub args: HashMap<String, String>,
    /// Path
    pub path: String,
    /// Standard input data
    pub stdin_data: Vec<u8>,
}

/// Result format shared by CNI 0.3.0 and later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniResult {
    /// CNI specification version
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Interfaces described by the result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    /// IP configurations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IPConfig>,
    /// Routes to configure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// DNS configuration
    #[serde(default)]
    pub dns: DNS,
}

/// Interface information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Sandbox path (network namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// IP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IPConfig {
    /// IP family, only written for versions before 1.0.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// IP address with prefix length
    pub address: String,
    /// Gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Index into `interfaces` of the interface this IP is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
}

/// DNS configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DNS {
    /// DNS nameservers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// DNS domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// DNS search domains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    /// DNS options
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Route configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination CIDR
    pub dst: String,
    /// Gateway for this route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
}

/// Result format of CNI 0.1.0 and 0.2.0
#[derive(Debug, Clone, Serialize)]
struct LegacyResult<'a> {
    #[serde(rename = "cniVersion")]
    cni_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip4: Option<LegacyIPConfig<'a>>,
    dns: &'a DNS,
}

#[derive(Debug, Clone, Serialize)]
struct LegacyIPConfig<'a> {
    ip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway: Option<&'a str>,
    #[serde(skip_serializing_if = "no_routes")]
    routes: &'a [Route],
}

fn no_routes(routes: &&[Route]) -> bool {
    routes.is_empty()
}

/// CNI error document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResult {
    /// CNI specification version
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// CNI error code
    pub code: u32,
    /// Short message
    pub msg: String,
    /// Longer explanation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

/// Answer to the VERSION command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResult {
    /// CNI specification version of this document
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Versions the plugin accepts
    #[serde(rename = "supportedVersions")]
    pub supported_versions: Vec<String>,
}

impl VersionResult {
    /// Versions this plugin supports
    pub fn current() -> Self {
        Self {
            cni_version: CURRENT_VERSION.to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl CniResult {
    /// Create a new empty result
    pub fn new(cni_version: &str) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            interfaces: Vec::new(),
            ips: Vec::new(),
            routes: Vec::new(),
            dns: DNS::default(),
        }
    }

    /// Add an interface to the result, returning its index
    pub fn add_interface(&mut self, interface: Interface) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    /// Add an IP configuration to the result
    pub fn add_ip(&mut self, ip: IPConfig) {
        self.ips.push(ip);
    }

    /// Add a route to the result
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Set DNS configuration
    pub fn set_dns(&mut self, dns: DNS) {
        self.dns = dns;
    }

    /// Encode the result in the layout of its `cni_version`
    pub fn encode(&self) -> Result<String> {
        let version = self.cni_version.as_str();
        let encoded = match version {
            "0.1.0" | "0.2.0" => serde_json::to_string_pretty(&self.to_legacy()?),
            "0.3.0" | "0.3.1" | "0.4.0" => serde_json::to_string_pretty(&self.with_ip_family(true)),
            "1.0.0" => serde_json::to_string_pretty(&self.with_ip_family(false)),
            _ => return Err(Error::UnsupportedVersion(version.to_string())),
        };

        encoded.map_err(|e| Error::Serialization {
            version: version.to_string(),
            reason: e.to_string(),
        })
    }

    fn with_ip_family(&self, tagged: bool) -> CniResult {
        let mut result = self.clone();
        for ip in &mut result.ips {
            ip.version = if tagged { Some("4".to_string()) } else { None };
        }
        result
    }

    fn to_legacy(&self) -> Result<LegacyResult<'_>> {
        // The legacy layout has a single IPv4 block and no interface list
        if self.ips.len() > 1 {
            return Err(Error::Serialization {
                version: self.cni_version.clone(),
                reason: format!("cannot express {} IPv4 configs", self.ips.len()),
            });
        }

        let ip4 = self.ips.first().map(|ip| LegacyIPConfig {
            ip: &ip.address,
            gateway: ip.gateway.as_deref(),
            routes: &self.routes,
        });

        Ok(LegacyResult {
            cni_version: &self.cni_version,
            ip4,
            dns: &self.dns,
        })
    }
}
