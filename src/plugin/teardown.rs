use std::io;
use std::net::Ipv4Addr;
use std::path::Path;

use itertools::Itertools;
use tracing::{info, warn};

use crate::error::Error;
use crate::inventory::Inventory;
use crate::link::{LinkControl, NamespaceAddress};
use crate::netns::{NamespaceControl, PinnedContext};

/// What looking inside the container namespace turned up
#[derive(Debug)]
pub enum NamespaceLookup {
    /// The device was found; these are its IPv4 addresses
    Resolved(Vec<NamespaceAddress>),
    /// The namespace or device could not be inspected
    Unresolved { reason: String },
}

impl NamespaceLookup {
    /// Addresses found, empty when unresolved
    pub fn addresses(&self) -> &[NamespaceAddress] {
        match self {
            Self::Resolved(addrs) => addrs,
            Self::Unresolved { .. } => &[],
        }
    }

    /// Lookup that never ran because its thread could not be started
    pub(crate) fn thread_unavailable(err: io::Error) -> Self {
        Self::Unresolved {
            reason: format!("cannot start namespace thread: {}", err),
        }
    }
}

/// Outcome of returning discovered addresses to the inventory
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Addresses handed back
    pub released: Vec<Ipv4Addr>,
    /// Addresses the inventory refused, with the reason
    pub failed: Vec<(Ipv4Addr, String)>,
    /// Addresses kept allocated on request
    pub retained: Vec<Ipv4Addr>,
}

impl ReleaseReport {
    /// True when every attempted release went through
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// List the IPv4 addresses on `ifname` inside the namespace at `netns`.
///
/// Never fails: anything that stops the lookup becomes
/// [`NamespaceLookup::Unresolved`], so DEL of a namespace that is already
/// gone still succeeds.
pub fn resolve_addresses<N, L>(
    ctx: &PinnedContext,
    namespaces: &N,
    link: &L,
    netns: &str,
    ifname: &str,
) -> NamespaceLookup
where
    N: NamespaceControl,
    L: LinkControl,
{
    if netns.is_empty() {
        return NamespaceLookup::Unresolved {
            reason: "no network namespace given".to_string(),
        };
    }

    match namespaces.with_namespace(ctx, Path::new(netns), || link.ipv4_addresses(ifname)) {
        Ok(addrs) => NamespaceLookup::Resolved(addrs),
        Err(e) => NamespaceLookup::Unresolved {
            reason: e.to_string(),
        },
    }
}

/// Release every address in `addrs` unless `skip` asks to keep them
pub fn release_addresses<I: Inventory>(
    inventory: &I,
    addrs: &[NamespaceAddress],
    skip: bool,
) -> ReleaseReport {
    let ips: Vec<Ipv4Addr> = addrs.iter().map(NamespaceAddress::ip).collect();

    if skip {
        if !ips.is_empty() {
            info!(addresses = %ips.iter().join(", "), "deallocation skipped, keeping addresses");
        }
        return ReleaseReport {
            retained: ips,
            ..ReleaseReport::default()
        };
    }

    let (released, failed): (Vec<Ipv4Addr>, Vec<(Ipv4Addr, String)>) =
        ips.into_iter().partition_map(|ip| match inventory.release(ip) {
            Ok(()) => {
                info!(%ip, "released address");
                itertools::Either::Left(ip)
            }
            Err(source) => {
                let err = Error::Release { ip, source };
                warn!(error = %err, "address release failed");
                itertools::Either::Right((ip, err.to_string()))
            }
        });

    ReleaseReport {
        released,
        failed,
        retained: Vec::new(),
    }
}
