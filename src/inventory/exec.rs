use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{AllocationResult, InterfaceDescriptor, Inventory};
use crate::error::InventoryError;

/// Exit status the helper uses to say the pool has nothing left at an index
const EXIT_EXHAUSTED: i32 = 3;

/// Inventory backed by an external helper executable.
///
/// Each request runs `<helper> <verb> [flags]`; answers are JSON on stdout and
/// failures are a non-zero exit with the reason on stderr.
#[derive(Debug, Clone)]
pub struct ExecInventory {
    helper: PathBuf,
}

impl ExecInventory {
    /// Create an inventory that talks to `helper`
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    fn run(&self, operation: &str, args: &[String]) -> Result<Output, InventoryError> {
        debug!(helper = %self.helper.display(), operation, ?args, "calling inventory helper");

        let output = Command::new(&self.helper)
            .arg(operation)
            .args(args)
            .output()
            .map_err(|source| InventoryError::Spawn {
                helper: self.helper.display().to_string(),
                source,
            })?;

        Ok(output)
    }

    fn request<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: &[String],
    ) -> Result<T, InventoryError> {
        let output = self.run(operation, args)?;
        check_status(operation, &output)?;

        serde_json::from_slice(&output.stdout).map_err(|source| InventoryError::Decode {
            operation: operation.to_string(),
            source,
        })
    }
}

fn check_status(operation: &str, output: &Output) -> Result<(), InventoryError> {
    if output.status.success() {
        return Ok(());
    }

    Err(InventoryError::Remote {
        operation: operation.to_string(),
        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

impl Inventory for ExecInventory {
    fn find_free_at_index(&self, index: u32) -> Result<Vec<AllocationResult>, InventoryError> {
        self.request("free", &["--index".to_string(), index.to_string()])
    }

    fn allocate_at_index(&self, index: u32) -> Result<AllocationResult, InventoryError> {
        let args = ["--index".to_string(), index.to_string()];
        let output = self.run("allocate", &args)?;

        if output.status.code() == Some(EXIT_EXHAUSTED) {
            return Err(InventoryError::Exhausted(index));
        }
        check_status("allocate", &output)?;

        serde_json::from_slice(&output.stdout).map_err(|source| InventoryError::Decode {
            operation: "allocate".to_string(),
            source,
        })
    }

    fn create_interface(
        &self,
        sec_group_ids: &[String],
        subnet_tags: &BTreeMap<String, String>,
    ) -> Result<InterfaceDescriptor, InventoryError> {
        let mut args = Vec::new();
        for group in sec_group_ids {
            args.push("--security-group".to_string());
            args.push(group.clone());
        }
        for (key, value) in subnet_tags {
            args.push("--subnet-tag".to_string());
            args.push(format!("{}={}", key, value));
        }

        self.request("create-interface", &args)
    }

    fn release(&self, ip: Ipv4Addr) -> Result<(), InventoryError> {
        let output = self.run("release", &["--ip".to_string(), ip.to_string()])?;
        check_status("release", &output)
    }
}
