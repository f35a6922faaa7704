use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::io::{self, Read};
use std::str::FromStr;
use tracing::info;

use crate::config::{PluginConfig, RuntimeSettings};
use crate::error::Error;
use crate::inventory::{ExecInventory, Inventory};
use crate::link::{IpCommandLink, LinkControl};
use crate::lock::{ExclusiveScope, FileLock};
use crate::netns::{NamespaceControl, SetnsNamespace};
use crate::plugin::IpamPlugin;
use crate::types::{is_supported_version, CmdArgs, VersionResult};

/// CNI verbs this plugin answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Give the container an address
    Add,
    /// Take the container's addresses back
    Del,
    /// Report supported versions
    Version,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADD" => Ok(Self::Add),
            "DEL" => Ok(Self::Del),
            "VERSION" => Ok(Self::Version),
            _ => anyhow::bail!("Unknown CNI command: {}", s),
        }
    }
}

/// Invocation environment set by the container runtime
#[derive(Debug, Parser)]
#[clap(name = "eni-ipam", version, about = "CNI IPAM plugin for secondary cloud-interface addresses")]
pub struct CniEnv {
    /// Operation to perform
    #[clap(long, env = "CNI_COMMAND")]
    pub command: String,

    /// Container ID
    #[clap(long, env = "CNI_CONTAINERID", default_value = "")]
    pub container_id: String,

    /// Network namespace path
    #[clap(long, env = "CNI_NETNS", default_value = "")]
    pub netns: String,

    /// Interface name inside the container
    #[clap(long, env = "CNI_IFNAME", default_value = "")]
    pub ifname: String,

    /// Extra arguments (K=V;K2=V2)
    #[clap(long, env = "CNI_ARGS", default_value = "")]
    pub args: String,

    /// Plugin search path
    #[clap(long, env = "CNI_PATH", default_value = "")]
    pub path: String,

    #[clap(flatten)]
    pub settings: RuntimeSettings,
}

impl CniEnv {
    /// Read the invocation environment of this process
    pub fn from_env() -> std::result::Result<Self, Error> {
        Self::try_parse().map_err(Error::Environment)
    }

    /// Combine the environment with stdin into command arguments
    pub fn to_cmd_args(&self, stdin_data: Vec<u8>) -> CmdArgs {
        CmdArgs {
            container_id: self.container_id.clone(),
            netns: self.netns.clone(),
            ifname: self.ifname.clone(),
            args: parse_cni_args(&self.args),
            path: self.path.clone(),
            stdin_data,
        }
    }
}

/// Parse CNI_ARGS string into key-value pairs
pub fn parse_cni_args(args_str: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();

    if !args_str.is_empty() {
        for pair in args_str.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                args.insert(key.to_string(), value.to_string());
            }
        }
    }

    args
}

/// Run one command and return what should be written to stdout.
///
/// ADD and DEL run entirely inside the exclusive scope, configuration parsing
/// included.
pub fn execute<S, I, L, N>(
    scope: &S,
    plugin: &IpamPlugin<I, L, N>,
    command: Command,
    args: &CmdArgs,
) -> Result<Option<String>>
where
    S: ExclusiveScope,
    I: Inventory,
    L: LinkControl,
    N: NamespaceControl,
{
    match command {
        Command::Version => {
            let json = serde_json::to_string(&VersionResult::current())?;
            Ok(Some(json))
        }
        Command::Add => scope.with_exclusive(|| cmd_add(plugin, args))?,
        Command::Del => scope.with_exclusive(|| cmd_del(plugin, args))?,
    }
}

fn parse_config(args: &CmdArgs) -> Result<PluginConfig> {
    let conf = PluginConfig::parse(&args.stdin_data)?;
    if !is_supported_version(&conf.cni_version) {
        return Err(Error::UnsupportedVersion(conf.cni_version).into());
    }
    Ok(conf)
}

/// Execute the add command
fn cmd_add<I, L, N>(plugin: &IpamPlugin<I, L, N>, args: &CmdArgs) -> Result<Option<String>>
where
    I: Inventory,
    L: LinkControl,
    N: NamespaceControl,
{
    let conf = parse_config(args)?;

    let result = plugin.add_network(&conf, args)?;
    let json = result.encode()?;

    Ok(Some(json))
}

/// Execute the delete command
fn cmd_del<I, L, N>(plugin: &IpamPlugin<I, L, N>, args: &CmdArgs) -> Result<Option<String>>
where
    I: Inventory,
    L: LinkControl,
    N: NamespaceControl,
{
    let conf = parse_config(args)?;

    let outcome = plugin.del_network(&conf, args)?;
    info!(
        released = outcome.report.released.len(),
        retained = outcome.report.retained.len(),
        failed = outcome.report.failed.len(),
        "delete finished"
    );

    Ok(None)
}

/// Main entry point for the CNI plugin
pub fn run_cni() -> Result<()> {
    let env = CniEnv::from_env().context("Failed to read CNI environment")?;
    let command: Command = env.command.parse()?;

    let mut stdin_data = Vec::new();
    if command != Command::Version {
        io::stdin()
            .read_to_end(&mut stdin_data)
            .context("Failed to read from stdin")?;
    }
    let args = env.to_cmd_args(stdin_data);

    let settings = &env.settings;
    let plugin = IpamPlugin::new(
        ExecInventory::new(settings.inventory_helper.clone()),
        IpCommandLink::new(settings.link_poll_attempts, settings.link_poll_interval),
        SetnsNamespace,
    );
    let lock = FileLock::new(settings.lock_path.clone());

    if let Some(output) = execute(&lock, &plugin, command, &args)? {
        println!("{}", output);
    }

    Ok(())
}
