//! Veth pair management
//!
//! A [`VethPair`] is created atomically from the engine's point of view:
//! both endpoints exist or neither does. Once an endpoint has been moved
//! into a namespace it is no longer reachable from the host, so teardown
//! always deletes through an endpoint that is still on the host side.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::commands::veth_endpoint_names;
use crate::error::{TopologyError, TopologyResult};
use crate::net::NetworkControl;

/// One end of a veth pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Veth {
    /// Interface name
    pub name: String,
    /// Whether the endpoint has been moved into a namespace
    pub attached: bool,
}

impl Veth {
    /// Create a detached endpoint
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attached: false,
        }
    }
}

/// Two-ended virtual wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethPair {
    /// First endpoint (`<name>-left`)
    pub left: Veth,
    /// Second endpoint (`<name>-right`)
    pub right: Veth,
    /// Whether the pair exists on the host
    pub active: bool,
}

impl VethPair {
    /// Describe a not-yet-created pair named after `name`
    pub fn new(name: &str) -> Self {
        let (left, right) = veth_endpoint_names(name);
        Self {
            left: Veth::new(left),
            right: Veth::new(right),
            active: false,
        }
    }

    /// `left@right`, used in logs and errors
    pub fn label(&self) -> String {
        format!("{}@{}", self.left.name, self.right.name)
    }

    /// Create the pair on the host
    #[instrument(skip(self, net), fields(pair = %self.label()))]
    pub async fn create(&mut self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if self.active {
            return Err(TopologyError::AlreadyActive { pair: self.label() });
        }

        net.create_veth_pair(&self.left.name, &self.right.name)
            .await?;

        self.active = true;
        info!("succeeded to create {}", self.label());
        Ok(())
    }

    /// Delete the pair through whichever endpoint is still on the host
    ///
    /// When both endpoints sit inside namespaces the pair cannot be reached
    /// from the host; that is logged and treated as success; the pair goes
    /// away with the namespaces.
    #[instrument(skip(self, net), fields(pair = %self.label()))]
    pub async fn destroy(&mut self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if !self.active {
            return Err(TopologyError::NotActive { pair: self.label() });
        }

        let host_side = if !self.left.attached {
            Some(&self.left.name)
        } else if !self.right.attached {
            Some(&self.right.name)
        } else {
            None
        };

        let Some(device) = host_side else {
            info!("veth-pair {} is invisible from host", self.label());
            return Ok(());
        };

        net.delete_device(device).await?;

        self.active = false;
        info!("succeeded to delete {}", self.label());
        Ok(())
    }
}
