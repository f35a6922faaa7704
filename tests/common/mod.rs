// Shared fakes for the plugin's collaborators.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use eni_ipam::error::{Error, InventoryError, Result};
use eni_ipam::inventory::{AllocationResult, InterfaceDescriptor, Inventory};
use eni_ipam::link::{LinkControl, NamespaceAddress};
use eni_ipam::netns::{NamespaceControl, PinnedContext};
use eni_ipam::types::CmdArgs;

/// Build an interface in 10.0.1.0/24 of VPC 10.0.0.0/16
pub fn interface(number: u32, ipv4s: &[&str]) -> InterfaceDescriptor {
    InterfaceDescriptor {
        id: format!("eni-{:04}", number),
        mac: format!("0a:00:00:00:00:{:02x}", number),
        local_name: format!("eth{}", number),
        number,
        subnet_cidr: "10.0.1.0/24".parse().unwrap(),
        vpc_primary_cidr: "10.0.0.0/16".parse().unwrap(),
        vpc_cidrs: vec!["10.0.0.0/16".parse().unwrap()],
        ipv4s: ipv4s.iter().map(|ip| ip.parse().unwrap()).collect(),
    }
}

/// Pair an address with an interface
pub fn allocation(ip: &str, iface: InterfaceDescriptor) -> AllocationResult {
    AllocationResult {
        ip: ip.parse().unwrap(),
        interface: iface,
    }
}

/// A valid network configuration
pub fn config_json(skip_deallocation: bool) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "name": "eni",
        "cniVersion": "0.3.1",
        "ipam": {
            "secGroupIds": ["sg-1234"],
            "subnetTags": {"cni": "pods"},
            "interfaceIndex": 1,
            "skipDeallocation": skip_deallocation
        }
    }))
    .unwrap()
}

/// Command arguments around `stdin_data`
pub fn cmd_args(netns: &str, stdin_data: Vec<u8>) -> CmdArgs {
    CmdArgs {
        container_id: "container-1".to_string(),
        netns: netns.to_string(),
        ifname: "eth0".to_string(),
        args: HashMap::new(),
        path: "/opt/cni/bin".to_string(),
        stdin_data,
    }
}

/// A call the inventory received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindFree(u32),
    Allocate(u32),
    CreateInterface(Vec<String>, BTreeMap<String, String>),
    Release(Ipv4Addr),
}

/// When one inventory call ran, and on which thread
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    pub thread: ThreadId,
    pub start: Instant,
    pub end: Instant,
}

/// Inventory answering from canned responses and recording every call
#[derive(Default)]
pub struct RecordingInventory {
    pub free: Vec<AllocationResult>,
    pub free_fails: bool,
    pub allocate: Option<AllocationResult>,
    pub new_interface: Option<InterfaceDescriptor>,
    pub failing_releases: Vec<Ipv4Addr>,
    /// How long each call pretends to take
    pub latency: Duration,
    /// Set while a [`FakeNamespace`] runs its closure
    pub namespace_flag: Option<Arc<AtomicBool>>,
    pub calls: Mutex<Vec<Call>>,
    pub intervals: Mutex<Vec<Interval>>,
    /// For each release, whether it ran inside the namespace
    pub releases_in_namespace: Mutex<Vec<bool>>,
}

impl RecordingInventory {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every call's interval, in completion order
    pub fn intervals(&self) -> Vec<Interval> {
        self.intervals.lock().unwrap().clone()
    }

    /// First start and last end of the calls made from each thread
    pub fn spans_by_thread(&self) -> Vec<(Instant, Instant)> {
        let mut spans: HashMap<ThreadId, (Instant, Instant)> = HashMap::new();
        for iv in self.intervals() {
            let span = spans.entry(iv.thread).or_insert((iv.start, iv.end));
            span.0 = span.0.min(iv.start);
            span.1 = span.1.max(iv.end);
        }
        let mut spans: Vec<_> = spans.into_values().collect();
        spans.sort();
        spans
    }

    pub fn releases_in_namespace(&self) -> Vec<bool> {
        self.releases_in_namespace.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Release(_)))
            .count()
    }

    fn record(&self, call: Call) {
        let start = Instant::now();
        self.calls.lock().unwrap().push(call);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.intervals.lock().unwrap().push(Interval {
            thread: thread::current().id(),
            start,
            end: Instant::now(),
        });
    }
}

impl Inventory for RecordingInventory {
    fn find_free_at_index(&self, index: u32) -> std::result::Result<Vec<AllocationResult>, InventoryError> {
        self.record(Call::FindFree(index));
        if self.free_fails {
            return Err(InventoryError::Remote {
                operation: "free".to_string(),
                reason: "metadata service timeout".to_string(),
            });
        }
        Ok(self.free.clone())
    }

    fn allocate_at_index(&self, index: u32) -> std::result::Result<AllocationResult, InventoryError> {
        self.record(Call::Allocate(index));
        self.allocate.clone().ok_or(InventoryError::Exhausted(index))
    }

    fn create_interface(
        &self,
        sec_group_ids: &[String],
        subnet_tags: &BTreeMap<String, String>,
    ) -> std::result::Result<InterfaceDescriptor, InventoryError> {
        self.record(Call::CreateInterface(sec_group_ids.to_vec(), subnet_tags.clone()));
        self.new_interface.clone().ok_or_else(|| InventoryError::Remote {
            operation: "create-interface".to_string(),
            reason: "interface limit reached".to_string(),
        })
    }

    fn release(&self, ip: Ipv4Addr) -> std::result::Result<(), InventoryError> {
        self.record(Call::Release(ip));
        let inside = self
            .namespace_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        self.releases_in_namespace.lock().unwrap().push(inside);
        if self.failing_releases.contains(&ip) {
            return Err(InventoryError::Remote {
                operation: "release".to_string(),
                reason: "address not assigned".to_string(),
            });
        }
        Ok(())
    }
}

/// Link control with scripted answers
#[derive(Default)]
pub struct ScriptedLink {
    pub fail_bring_up: bool,
    pub addresses: Vec<NamespaceAddress>,
    pub missing_device: bool,
    pub brought_up: Mutex<Vec<String>>,
}

impl ScriptedLink {
    pub fn with_addresses(addrs: &[&str]) -> Self {
        Self {
            addresses: addrs
                .iter()
                .map(|a| NamespaceAddress {
                    network: a.parse().unwrap(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn brought_up(&self) -> Vec<String> {
        self.brought_up.lock().unwrap().clone()
    }
}

impl LinkControl for ScriptedLink {
    fn bring_up_and_poll(&self, device: &str) -> Result<()> {
        self.brought_up.lock().unwrap().push(device.to_string());
        if self.fail_bring_up {
            return Err(Error::activation(device, "link never came up"));
        }
        Ok(())
    }

    fn ipv4_addresses(&self, device: &str) -> Result<Vec<NamespaceAddress>> {
        if self.missing_device {
            return Err(Error::Link {
                device: device.to_string(),
                reason: "Cannot find device".to_string(),
            });
        }
        Ok(self.addresses.clone())
    }
}

/// Namespace control that runs the closure in place
#[derive(Default)]
pub struct FakeNamespace {
    pub missing: bool,
    /// True while the closure runs
    pub inside: Arc<AtomicBool>,
    pub entered: Mutex<Vec<String>>,
}

impl FakeNamespace {
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn entered(&self) -> Vec<String> {
        self.entered.lock().unwrap().clone()
    }
}

impl NamespaceControl for FakeNamespace {
    fn with_namespace<F, R>(&self, _ctx: &PinnedContext, path: &Path, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        if self.missing {
            return Err(Error::namespace(
                path.display().to_string(),
                "No such file or directory",
            ));
        }
        self.entered
            .lock()
            .unwrap()
            .push(path.display().to_string());
        self.inside.store(true, Ordering::SeqCst);
        let result = f();
        self.inside.store(false, Ordering::SeqCst);
        result
    }
}
