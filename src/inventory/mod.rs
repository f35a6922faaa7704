//! Interface and address inventory.
//!
//! The inventory owns the knowledge of which cloud interfaces are attached to
//! this host and which of their secondary addresses are in use. The plugin
//! only consumes it through the [`Inventory`] trait; [`ExecInventory`] is the
//! production binding, which delegates every request to a helper executable.

mod exec;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

pub use exec::ExecInventory;

/// A cloud network interface attached to this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    /// Cloud-side interface identifier
    pub id: String,
    /// Hardware address
    #[serde(default)]
    pub mac: String,
    /// Device name on the host, empty when the device is not visible yet
    #[serde(default)]
    pub local_name: String,
    /// Attachment slot of the interface
    pub number: u32,
    /// Subnet the interface lives in
    pub subnet_cidr: Ipv4Network,
    /// Primary CIDR of the VPC
    pub vpc_primary_cidr: Ipv4Network,
    /// Every CIDR associated with the VPC
    #[serde(default)]
    pub vpc_cidrs: Vec<Ipv4Network>,
    /// Addresses assigned to the interface
    #[serde(default)]
    pub ipv4s: Vec<Ipv4Addr>,
}

impl InterfaceDescriptor {
    /// Name the interface is reported under in a CNI result
    pub fn slot_name(&self) -> String {
        format!("eth{}", self.number)
    }
}

/// One address together with the interface that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Allocated address
    pub ip: Ipv4Addr,
    /// Interface the address belongs to
    pub interface: InterfaceDescriptor,
}

/// Operations the plugin needs from the inventory
pub trait Inventory: Send + Sync {
    /// Addresses allocated at `index` that no container currently uses
    fn find_free_at_index(&self, index: u32) -> Result<Vec<AllocationResult>, InventoryError>;

    /// Allocate a new address on an existing interface at `index`
    fn allocate_at_index(&self, index: u32) -> Result<AllocationResult, InventoryError>;

    /// Create and attach a new interface
    fn create_interface(
        &self,
        sec_group_ids: &[String],
        subnet_tags: &BTreeMap<String, String>,
    ) -> Result<InterfaceDescriptor, InventoryError>;

    /// Return an address to the pool
    fn release(&self, ip: Ipv4Addr) -> Result<(), InventoryError>;
}

impl<T: Inventory + ?Sized> Inventory for &T {
    fn find_free_at_index(&self, index: u32) -> Result<Vec<AllocationResult>, InventoryError> {
        (**self).find_free_at_index(index)
    }

    fn allocate_at_index(&self, index: u32) -> Result<AllocationResult, InventoryError> {
        (**self).allocate_at_index(index)
    }

    fn create_interface(
        &self,
        sec_group_ids: &[String],
        subnet_tags: &BTreeMap<String, String>,
    ) -> Result<InterfaceDescriptor, InventoryError> {
        (**self).create_interface(sec_group_ids, subnet_tags)
    }

    fn release(&self, ip: Ipv4Addr) -> Result<(), InventoryError> {
        (**self).release(ip)
    }
}
