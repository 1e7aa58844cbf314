//! Topology description.
//!
//! A topology is a YAML document listing links (direct links and bridges)
//! and namespaces. Each namespace declares the devices it expects, by the
//! name of the link or bridge that should serve them, with the address to
//! assign, plus optional commands to run once everything is wired.
//!
//! ```yaml
//! links:
//!   - name: L1
//!     mode: direct_link
//! namespaces:
//!   - name: ns1
//!     devices:
//!       - name: L1
//!         cidr: 10.0.0.1/24
//!     commands:
//!       - ip link set $(L1) up
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::commands::{bridge_pair_name, veth_endpoint_names, MAX_IFNAME_LEN};
use crate::error::{TopologyError, TopologyResult};

/// Kind of a declared link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMode {
    /// Point-to-point veth pair between two namespaces.
    #[serde(rename = "direct_link", alias = "direct")]
    DirectLink,
    /// OVS bridge serving any number of namespaces.
    #[serde(rename = "bridge")]
    Bridge,
}

impl LinkMode {
    /// Returns the mode as written in the topology file.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::DirectLink => "direct_link",
            LinkMode::Bridge => "bridge",
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared link or bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Link mode.
    pub mode: LinkMode,
    /// Link name, referenced by namespace devices.
    pub name: String,
}

impl LinkConfig {
    /// Creates a direct link declaration.
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            mode: LinkMode::DirectLink,
            name: name.into(),
        }
    }

    /// Creates a bridge declaration.
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            mode: LinkMode::Bridge,
            name: name.into(),
        }
    }
}

/// A device a namespace expects to receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name of the link or bridge serving this device.
    pub name: String,
    /// Address to assign, e.g. `10.0.0.1/24`.
    pub cidr: String,
}

/// A declared namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace name.
    pub name: String,
    /// Devices in declaration order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Commands run inside the namespace after provisioning.
    #[serde(default)]
    pub commands: Vec<String>,
}

impl NamespaceConfig {
    /// Creates a namespace declaration without devices.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a device.
    pub fn with_device(mut self, name: impl Into<String>, cidr: impl Into<String>) -> Self {
        self.devices.push(DeviceConfig {
            name: name.into(),
            cidr: cidr.into(),
        });
        self
    }

    /// Adds a post-provision command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }
}

/// A complete topology description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Links and bridges in declaration order.
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    /// Namespaces in declaration order.
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

impl TopologyConfig {
    /// Parses and validates a YAML topology.
    pub fn from_yaml(input: &str) -> TopologyResult<Self> {
        let cfg = Self::parse_unchecked(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a YAML topology without validating it.
    pub fn parse_unchecked(input: &str) -> TopologyResult<Self> {
        serde_yaml::from_str(input)
            .map_err(|e| TopologyError::invalid_config("topology", format!("failed to parse config: {}", e)))
    }

    /// Direct link declarations in order.
    pub fn direct_links(&self) -> impl Iterator<Item = &LinkConfig> {
        self.links.iter().filter(|l| l.mode == LinkMode::DirectLink)
    }

    /// Bridge declarations in order.
    pub fn bridges(&self) -> impl Iterator<Item = &LinkConfig> {
        self.links.iter().filter(|l| l.mode == LinkMode::Bridge)
    }

    /// Looks up a namespace declaration by name.
    pub fn namespace(&self, name: &str) -> Option<&NamespaceConfig> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }

    /// Host interfaces provisioning will create, each with the link that
    /// owns it.
    ///
    /// A direct link owns one veth pair. A bridge owns its own device plus
    /// one pair per namespace device that names it.
    pub fn host_interface_names(&self) -> Vec<(String, &str)> {
        let mut names = Vec::new();
        for link in &self.links {
            let owner = link.name.as_str();
            let pairs = match link.mode {
                LinkMode::DirectLink => vec![link.name.clone()],
                LinkMode::Bridge => {
                    names.push((link.name.clone(), owner));
                    let attachments = self
                        .namespaces
                        .iter()
                        .flat_map(|ns| &ns.devices)
                        .filter(|d| d.name == link.name)
                        .count();
                    (0..attachments)
                        .map(|i| bridge_pair_name(&link.name, i))
                        .collect()
                }
            };
            for pair in pairs {
                let (left, right) = veth_endpoint_names(&pair);
                names.push((left, owner));
                names.push((right, owner));
            }
        }
        names
    }

    /// Checks names and references.
    ///
    /// - link and namespace names are non-empty and unique
    /// - every device names a declared link or bridge
    /// - every host interface name fits the kernel limit and is created
    ///   by exactly one link
    pub fn validate(&self) -> TopologyResult<()> {
        let mut link_names = HashSet::new();
        for link in &self.links {
            if link.name.is_empty() {
                return Err(TopologyError::invalid_config(
                    "links.name",
                    "link name must not be empty",
                ));
            }
            if !link_names.insert(link.name.as_str()) {
                return Err(TopologyError::invalid_config(
                    "links.name",
                    format!("link name '{}' is duplicated", link.name),
                ));
            }
        }

        let mut ns_names = HashSet::new();
        for ns in &self.namespaces {
            if ns.name.is_empty() {
                return Err(TopologyError::invalid_config(
                    "namespaces.name",
                    "namespace name must not be empty",
                ));
            }
            if !ns_names.insert(ns.name.as_str()) {
                return Err(TopologyError::invalid_config(
                    "namespaces.name",
                    format!("namespace name '{}' must be unique", ns.name),
                ));
            }
            for device in &ns.devices {
                if !link_names.contains(device.name.as_str()) {
                    return Err(TopologyError::UnresolvedDevice {
                        namespace: ns.name.clone(),
                        device: device.name.clone(),
                    });
                }
            }
        }

        let mut owners: HashMap<String, &str> = HashMap::new();
        for (ifname, owner) in self.host_interface_names() {
            if ifname.len() > MAX_IFNAME_LEN {
                return Err(TopologyError::invalid_config(
                    "links.name",
                    format!(
                        "interface '{}' of link '{}' exceeds {} characters",
                        ifname, owner, MAX_IFNAME_LEN
                    ),
                ));
            }
            if let Some(other) = owners.insert(ifname.clone(), owner) {
                return Err(TopologyError::invalid_config(
                    "links.name",
                    format!(
                        "interface '{}' would be created by both '{}' and '{}'",
                        ifname, other, owner
                    ),
                ));
            }
        }

        Ok(())
    }
}
