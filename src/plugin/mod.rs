mod acquire;
mod teardown;

use tracing::{info, warn};

use crate::addressing::{self, NetworkSettings};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::inventory::{AllocationResult, Inventory};
use crate::link::LinkControl;
use crate::netns::{NamespaceControl, PinnedContext};
use crate::types::{CmdArgs, CniResult, IPConfig, Interface, Route, DNS};

pub use acquire::acquire;
pub use teardown::{release_addresses, resolve_addresses, NamespaceLookup, ReleaseReport};

/// Name of the thread namespace lookups run on
const NETNS_THREAD: &str = "eni-ipam-netns";

/// What a DEL did
#[derive(Debug)]
pub struct DelOutcome {
    /// Result of inspecting the container namespace
    pub lookup: NamespaceLookup,
    /// Result of handing addresses back
    pub report: ReleaseReport,
}

/// IPAM plugin wired to its collaborators
pub struct IpamPlugin<I, L, N> {
    inventory: I,
    link: L,
    namespaces: N,
}

impl<I, L, N> IpamPlugin<I, L, N>
where
    I: Inventory,
    L: LinkControl,
    N: NamespaceControl,
{
    /// Create a new plugin
    pub fn new(inventory: I, link: L, namespaces: N) -> Self {
        Self {
            inventory,
            link,
            namespaces,
        }
    }

    /// Hand an address to a container
    pub fn add_network(&self, config: &PluginConfig, args: &CmdArgs) -> Result<CniResult> {
        info!(
            container = %args.container_id,
            index = config.ipam.interface_index,
            "acquiring address"
        );

        let alloc = acquire(&self.inventory, &config.ipam)?;

        let device = alloc.interface.local_name.as_str();
        self.link.bring_up_and_poll(device).map_err(|e| match e {
            Error::Activation { .. } => e,
            other => Error::activation(device, other),
        })?;

        let settings = addressing::derive(&alloc)?;
        Ok(assemble_result(&config.cni_version, &alloc, &settings))
    }

    /// Take a container's addresses back
    pub fn del_network(&self, config: &PluginConfig, args: &CmdArgs) -> Result<DelOutcome> {
        // The lookup runs on its own thread; releases happen back out here,
        // where the host's credentials apply.
        let lookup = PinnedContext::run(NETNS_THREAD, |ctx| {
            resolve_addresses(ctx, &self.namespaces, &self.link, &args.netns, &args.ifname)
        })
        .unwrap_or_else(NamespaceLookup::thread_unavailable);

        match &lookup {
            NamespaceLookup::Resolved(addrs) => {
                info!(netns = %args.netns, ifname = %args.ifname, count = addrs.len(), "found addresses");
            }
            NamespaceLookup::Unresolved { reason } => {
                warn!(netns = %args.netns, ifname = %args.ifname, reason = %reason,
                    "could not inspect container namespace, nothing to release");
            }
        }

        let report = release_addresses(
            &self.inventory,
            lookup.addresses(),
            config.ipam.skip_deallocation,
        );
        if !report.is_clean() {
            warn!(
                failed = report.failed.len(),
                released = report.released.len(),
                "some addresses were not released"
            );
        }

        Ok(DelOutcome { lookup, report })
    }
}

/// Build the CNI result for an allocation
pub fn assemble_result(
    cni_version: &str,
    alloc: &AllocationResult,
    settings: &NetworkSettings,
) -> CniResult {
    let mut result = CniResult::new(cni_version);

    let iface_index = result.add_interface(Interface {
        name: alloc.interface.slot_name(),
        mac: None,
        sandbox: None,
    });

    let gateway = settings.gateway.to_string();
    result.add_ip(IPConfig {
        version: Some("4".to_string()),
        address: settings.address.to_string(),
        gateway: Some(gateway.clone()),
        interface: Some(iface_index),
    });

    result.set_dns(DNS {
        nameservers: vec![settings.dns.to_string()],
        ..DNS::default()
    });

    // every VPC CIDR is reached through the subnet router
    for dst in &settings.routes {
        result.add_route(Route {
            dst: dst.to_string(),
            gw: Some(gateway.clone()),
        });
    }

    result
}
