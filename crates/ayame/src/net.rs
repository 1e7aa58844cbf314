//! Host network primitives.
//!
//! The engine never spawns processes itself. Every OS mutation goes
//! through one of three capabilities:
//!
//! - [`NamespaceControl`]: `ip netns` operations
//! - [`LinkControl`]: veth creation and device deletion
//! - [`BridgeControl`]: `ovs-vsctl` bridge and port operations
//!
//! [`NetworkControl`] bundles the three so call sites take a single
//! `&dyn NetworkControl`. [`HostNetwork`] implements all of them on top of
//! a [`CommandRunner`], which decides whether the commands really run.

use async_trait::async_trait;
use ayame_common::shell::{self, CommandRunner, HostCommand};
use ayame_common::ShellError;
use ipnetwork::IpNetwork;
use std::sync::Arc;

use crate::commands::{
    build_add_br_cmd, build_add_port_cmd, build_addr_add_cmd, build_del_br_cmd,
    build_link_delete_cmd, build_link_set_netns_cmd, build_netns_add_cmd,
    build_netns_delete_cmd, build_netns_exec_cmd, build_netns_pids_cmd, build_veth_add_cmd,
    NETNS_MISSING,
};
use crate::error::{TopologyError, TopologyResult};

/// Namespace-control capability.
#[async_trait]
pub trait NamespaceControl: Send + Sync {
    /// Creates a named network namespace.
    async fn add_namespace(&self, name: &str) -> TopologyResult<()>;

    /// Deletes a named network namespace.
    async fn delete_namespace(&self, name: &str) -> TopologyResult<()>;

    /// Moves a host device into a namespace.
    async fn move_device_to_namespace(&self, device: &str, namespace: &str) -> TopologyResult<()>;

    /// Assigns an address to a device that lives inside a namespace.
    async fn assign_address(
        &self,
        device: &str,
        namespace: &str,
        cidr: &IpNetwork,
    ) -> TopologyResult<()>;

    /// Returns true if the namespace exists on the host.
    async fn namespace_exists(&self, name: &str) -> TopologyResult<bool>;

    /// Runs an argv inside a namespace.
    async fn exec_in_namespace(&self, namespace: &str, argv: &[String]) -> TopologyResult<()>;
}

/// Link-control capability.
#[async_trait]
pub trait LinkControl: Send + Sync {
    /// Creates a veth pair with the given endpoint names.
    async fn create_veth_pair(&self, left: &str, right: &str) -> TopologyResult<()>;

    /// Deletes a host device. Deleting one end of a veth pair removes both.
    async fn delete_device(&self, name: &str) -> TopologyResult<()>;
}

/// Bridge-control capability.
#[async_trait]
pub trait BridgeControl: Send + Sync {
    /// Creates a software bridge.
    async fn create_bridge(&self, name: &str) -> TopologyResult<()>;

    /// Deletes a software bridge.
    async fn delete_bridge(&self, name: &str) -> TopologyResult<()>;

    /// Adds a host device as a port of the bridge.
    async fn attach_device_to_bridge(&self, bridge: &str, device: &str) -> TopologyResult<()>;
}

/// All host capabilities the engine needs.
pub trait NetworkControl: NamespaceControl + LinkControl + BridgeControl {}

impl<T> NetworkControl for T where T: NamespaceControl + LinkControl + BridgeControl {}

/// `ip` / `ovs-vsctl` backed implementation of the capabilities.
#[derive(Clone)]
pub struct HostNetwork {
    runner: Arc<dyn CommandRunner>,
}

impl HostNetwork {
    /// Creates a host network over the given runner.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Returns true if commands are only logged.
    pub fn is_dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    /// Runs a command, wrapping any failure with the operation and resource.
    async fn exec(
        &self,
        operation: &'static str,
        resource: &str,
        cmd: HostCommand,
    ) -> TopologyResult<String> {
        shell::exec_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| TopologyError::primitive(operation, resource, e))
    }
}

#[async_trait]
impl NamespaceControl for HostNetwork {
    async fn add_namespace(&self, name: &str) -> TopologyResult<()> {
        self.exec("create namespace", name, build_netns_add_cmd(name))
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> TopologyResult<()> {
        self.exec("delete namespace", name, build_netns_delete_cmd(name))
            .await?;
        Ok(())
    }

    async fn move_device_to_namespace(&self, device: &str, namespace: &str) -> TopologyResult<()> {
        self.exec(
            "move device into namespace",
            &format!("{}@{}", device, namespace),
            build_link_set_netns_cmd(device, namespace),
        )
        .await?;
        Ok(())
    }

    async fn assign_address(
        &self,
        device: &str,
        namespace: &str,
        cidr: &IpNetwork,
    ) -> TopologyResult<()> {
        self.exec(
            "assign address",
            &format!("{}@{}", device, namespace),
            build_addr_add_cmd(device, namespace, &cidr.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> TopologyResult<bool> {
        let cmd = build_netns_pids_cmd(name);
        let result = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| TopologyError::primitive("probe namespace", name, e))?;
        if result.success() {
            return Ok(true);
        }
        // Only a missing namespace file means absent
        if result.stderr.contains(NETNS_MISSING) {
            return Ok(false);
        }
        Err(TopologyError::primitive(
            "probe namespace",
            name,
            ShellError::command_failed(cmd.to_string(), result.exit_code, result.combined_output()),
        ))
    }

    async fn exec_in_namespace(&self, namespace: &str, argv: &[String]) -> TopologyResult<()> {
        self.exec(
            "run command in namespace",
            namespace,
            build_netns_exec_cmd(namespace, argv.iter().cloned()),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LinkControl for HostNetwork {
    async fn create_veth_pair(&self, left: &str, right: &str) -> TopologyResult<()> {
        self.exec(
            "create veth pair",
            &format!("{}@{}", left, right),
            build_veth_add_cmd(left, right),
        )
        .await?;
        Ok(())
    }

    async fn delete_device(&self, name: &str) -> TopologyResult<()> {
        self.exec("delete device", name, build_link_delete_cmd(name))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BridgeControl for HostNetwork {
    async fn create_bridge(&self, name: &str) -> TopologyResult<()> {
        self.exec("create bridge", name, build_add_br_cmd(name)).await?;
        Ok(())
    }

    async fn delete_bridge(&self, name: &str) -> TopologyResult<()> {
        self.exec("delete bridge", name, build_del_br_cmd(name)).await?;
        Ok(())
    }

    async fn attach_device_to_bridge(&self, bridge: &str, device: &str) -> TopologyResult<()> {
        self.exec(
            "attach device to bridge",
            &format!("{}@{}", device, bridge),
            build_add_port_cmd(bridge, device),
        )
        .await?;
        Ok(())
    }
}
