use tracing::{debug, info, warn};

use crate::config::IpamConfig;
use crate::error::{Error, Result};
use crate::inventory::{AllocationResult, Inventory};

/// Obtain one address for the container.
///
/// Steps are tried in order and the first one that yields an address wins:
/// reuse an allocated address nobody holds, allocate on an existing interface,
/// attach a new interface. Nothing is retried.
pub fn acquire<I: Inventory>(inventory: &I, ipam: &IpamConfig) -> Result<AllocationResult> {
    let index = ipam.interface_index;

    // Addresses left behind by a crashed container or a torn down namespace
    match inventory.find_free_at_index(index) {
        Ok(free) => {
            if let Some(alloc) = free.into_iter().next() {
                info!(ip = %alloc.ip, interface = %alloc.interface.id, index, "reusing free address");
                return Ok(alloc);
            }
            debug!(index, "no free address");
        }
        Err(e) => warn!(index, error = %e, "free address lookup failed"),
    }

    match inventory.allocate_at_index(index) {
        Ok(alloc) => {
            info!(ip = %alloc.ip, interface = %alloc.interface.id, index, "allocated address");
            return Ok(alloc);
        }
        Err(e) => info!(index, error = %e, "allocation on existing interface failed"),
    }

    let iface = inventory
        .create_interface(&ipam.sec_group_ids, &ipam.subnet_tags)
        .map_err(|source| Error::Acquisition { index, source })?;

    // A fresh interface carries exactly its primary address. Anything else
    // means it changed under us; leave it for a later run to reclaim.
    let ip = match iface.ipv4s.as_slice() {
        [ip] => *ip,
        other => {
            return Err(Error::InconsistentInterface {
                interface: iface.id.clone(),
                count: other.len(),
            })
        }
    };

    info!(%ip, interface = %iface.id, "created interface");
    Ok(AllocationResult {
        ip,
        interface: iface,
    })
}
