//! Network namespace management.
//!
//! A [`Namespace`] owns an ordered list of [`DeviceSlot`]s, one per device
//! declared in the topology. Links and bridges fill those slots during
//! provisioning by calling [`Namespace::attach`] with the slot index the
//! binding resolver chose for them, so slots are never matched by
//! inspecting generated endpoint names.

use ipnetwork::IpNetwork;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::NamespaceConfig;
use crate::error::{TopologyError, TopologyResult};
use crate::net::NetworkControl;
use crate::veth::Veth;

/// Matches `$(<slot>)` command tokens.
static SLOT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\(([^()]+)\)$").expect("Invalid regex pattern"));

/// Position of a device slot: namespace index plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// Index into the namespace list.
    pub namespace: usize,
    /// Index into that namespace's device slots.
    pub slot: usize,
}

impl SlotRef {
    /// Creates a slot reference.
    pub fn new(namespace: usize, slot: usize) -> Self {
        Self { namespace, slot }
    }
}

/// A declared device awaiting a concrete endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSlot {
    /// Name of the link or bridge serving this slot.
    pub name: String,
    /// Address to assign once attached.
    pub cidr: String,
    /// Endpoint filling the slot, if any.
    pub attached_veth: Option<String>,
}

impl DeviceSlot {
    /// Creates an unconfigured slot.
    pub fn new(name: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr: cidr.into(),
            attached_veth: None,
        }
    }

    /// Returns true once an endpoint fills the slot.
    pub fn is_configured(&self) -> bool {
        self.attached_veth.is_some()
    }
}

/// An isolated network stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Device slots in declaration order.
    pub devices: Vec<DeviceSlot>,
}

impl Namespace {
    /// Builds the slot table from the declaration without touching the host.
    pub fn from_config(config: &NamespaceConfig) -> Self {
        Self {
            name: config.name.clone(),
            devices: config
                .devices
                .iter()
                .map(|d| DeviceSlot::new(&d.name, &d.cidr))
                .collect(),
        }
    }

    /// Creates the namespace on the host.
    #[instrument(skip(config, net), fields(namespace = %config.name))]
    pub async fn init(config: &NamespaceConfig, net: &dyn NetworkControl) -> TopologyResult<Self> {
        let ns = Self::from_config(config);
        net.add_namespace(&ns.name).await?;
        info!("succeeded to create ns {}", ns.name);
        Ok(ns)
    }

    /// Moves `endpoint` into this namespace and fills slot `slot` with it.
    ///
    /// The endpoint is marked attached and the slot configured only after
    /// both the move and the address assignment succeeded.
    #[instrument(skip(self, net, endpoint), fields(namespace = %self.name, endpoint = %endpoint.name))]
    pub async fn attach(
        &mut self,
        net: &dyn NetworkControl,
        slot: usize,
        endpoint: &mut Veth,
    ) -> TopologyResult<()> {
        if endpoint.attached {
            return Err(TopologyError::AlreadyAttached {
                endpoint: endpoint.name.clone(),
            });
        }

        let Some(device) = self.devices.get_mut(slot) else {
            return Err(TopologyError::NoMatchingSlot {
                namespace: self.name.clone(),
                endpoint: endpoint.name.clone(),
            });
        };

        if let Some(current) = &device.attached_veth {
            return Err(TopologyError::SlotAlreadyConfigured {
                namespace: self.name.clone(),
                slot: device.name.clone(),
                endpoint: current.clone(),
            });
        }

        let cidr: IpNetwork = device.cidr.parse().map_err(|e| TopologyError::InvalidCidr {
            cidr: device.cidr.clone(),
            message: format!("{}", e),
        })?;

        net.move_device_to_namespace(&endpoint.name, &self.name)
            .await?;
        net.assign_address(&endpoint.name, &self.name, &cidr)
            .await?;

        device.attached_veth = Some(endpoint.name.clone());
        endpoint.attached = true;

        info!(
            "succeeded to attach CIDR {} to dev {} on ns {}",
            cidr, endpoint.name, self.name
        );
        Ok(())
    }

    /// Returns the endpoint filling the first configured slot named `slot`.
    pub fn endpoint_for(&self, slot: &str) -> Option<&str> {
        self.devices
            .iter()
            .filter(|d| d.name == slot)
            .find_map(|d| d.attached_veth.as_deref())
    }

    /// Returns the number of configured slots.
    pub fn configured_slots(&self) -> usize {
        self.devices.iter().filter(|d| d.is_configured()).count()
    }

    /// Splits a command on whitespace and replaces `$(<slot>)` tokens with
    /// the endpoint filling that slot. Unresolved tokens are kept as-is.
    pub fn expand_command(&self, command: &str) -> Vec<String> {
        command
            .split_whitespace()
            .map(|token| {
                let Some(caps) = SLOT_TOKEN_RE.captures(token) else {
                    return token.to_string();
                };
                match self.endpoint_for(&caps[1]) {
                    Some(endpoint) => endpoint.to_string(),
                    None => {
                        warn!(
                            namespace = %self.name,
                            token = token,
                            "no configured device for token, leaving it unexpanded"
                        );
                        token.to_string()
                    }
                }
            })
            .collect()
    }

    /// Runs each command inside the namespace.
    ///
    /// Commands are independent: a failure is logged and the next command
    /// still runs. Returns the number of commands that failed.
    #[instrument(skip(self, net, commands), fields(namespace = %self.name))]
    pub async fn run_commands(&self, net: &dyn NetworkControl, commands: &[String]) -> usize {
        let mut failed = 0;
        for command in commands {
            let argv = self.expand_command(command);
            if argv.is_empty() {
                continue;
            }
            if let Err(e) = net.exec_in_namespace(&self.name, &argv).await {
                warn!(namespace = %self.name, command = %command, error = %e, "command failed");
                failed += 1;
            }
        }
        failed
    }

    /// Deletes the namespace. A namespace already gone from the host is
    /// treated as deleted.
    #[instrument(skip(self, net), fields(namespace = %self.name))]
    pub async fn destroy(&self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if !net.namespace_exists(&self.name).await? {
            info!("{} is already inactive", self.name);
            return Ok(());
        }

        net.delete_namespace(&self.name).await?;
        info!("succeeded to delete ns {}", self.name);
        Ok(())
    }
}
