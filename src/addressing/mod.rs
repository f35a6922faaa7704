//! Addressing conventions of the cloud network.
//!
//! Every subnet reserves its first addresses for the provider: the network
//! address plus one is the subnet router and the VPC primary network address
//! plus two is the resolver. These offsets are not configurable.
//!
//! All functions here require the CIDR to hold at least four addresses
//! (prefix length of 30 or less). Narrower CIDRs have no room for the reserved
//! offsets and are rejected with [`Error::Addressing`].

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::error::{Error, Result};
use crate::inventory::AllocationResult;

/// Widest prefix length that still leaves room for the reserved offsets
pub const MAX_CONVENTION_PREFIX: u8 = 30;

/// Offset of the subnet router from the network address
pub const GATEWAY_OFFSET: u32 = 1;

/// Offset of the resolver from the VPC primary network address
pub const DNS_OFFSET: u32 = 2;

/// Network settings handed to the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Allocated address with the subnet's prefix length
    pub address: Ipv4Network,
    /// Subnet router
    pub gateway: Ipv4Addr,
    /// Resolver
    pub dns: Ipv4Addr,
    /// Destinations reachable through the gateway
    pub routes: Vec<Ipv4Network>,
}

/// Address `offset` past the network address of `cidr`
pub fn reserved_address(cidr: Ipv4Network, offset: u32) -> Result<Ipv4Addr> {
    if cidr.prefix() > MAX_CONVENTION_PREFIX {
        return Err(Error::Addressing {
            cidr: cidr.to_string(),
            reason: format!(
                "prefix /{} is narrower than /{}",
                cidr.prefix(),
                MAX_CONVENTION_PREFIX
            ),
        });
    }

    let network = u32::from(cidr.network());
    Ok(Ipv4Addr::from(network + offset))
}

/// Subnet router of `subnet`
pub fn gateway_for(subnet: Ipv4Network) -> Result<Ipv4Addr> {
    reserved_address(subnet, GATEWAY_OFFSET)
}

/// Resolver of the VPC whose primary CIDR is `vpc_primary`
pub fn dns_for(vpc_primary: Ipv4Network) -> Result<Ipv4Addr> {
    reserved_address(vpc_primary, DNS_OFFSET)
}

/// Work out the container's network settings for an allocation
pub fn derive(alloc: &AllocationResult) -> Result<NetworkSettings> {
    let iface = &alloc.interface;
    let gateway = gateway_for(iface.subnet_cidr)?;
    let dns = dns_for(iface.vpc_primary_cidr)?;

    let address = Ipv4Network::new(alloc.ip, iface.subnet_cidr.prefix()).map_err(|e| {
        Error::Addressing {
            cidr: iface.subnet_cidr.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(NetworkSettings {
        address,
        gateway,
        dns,
        routes: iface.vpc_cidrs.clone(),
    })
}
