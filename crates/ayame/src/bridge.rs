//! OVS bridge management.
//!
//! A bridge serves any number of namespaces. Each attachment gets its own
//! veth pair named `<bridge>-<n>`: the left end goes into the namespace,
//! the right end becomes a port of the bridge and stays on the host.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::commands::bridge_pair_name;
use crate::config::{LinkConfig, LinkMode};
use crate::error::{TopologyError, TopologyResult};
use crate::namespace::{Namespace, SlotRef};
use crate::net::NetworkControl;
use crate::veth::VethPair;

/// A software switch and the veth pairs attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    /// Bridge name as declared.
    pub name: String,
    /// Whether the bridge exists on the host.
    pub active: bool,
    /// Attached pairs in attachment order.
    pub veth_pairs: Vec<VethPair>,
}

impl Bridge {
    /// Creates the bridge on the host.
    #[instrument(skip(config, net), fields(bridge = %config.name))]
    pub async fn init(config: &LinkConfig, net: &dyn NetworkControl) -> TopologyResult<Self> {
        if config.mode != LinkMode::Bridge {
            return Err(TopologyError::InvalidMode {
                name: config.name.clone(),
                expected: LinkMode::Bridge.to_string(),
                actual: config.mode.to_string(),
            });
        }

        net.create_bridge(&config.name).await?;
        info!("succeeded to create bridge {}", config.name);

        Ok(Self {
            name: config.name.clone(),
            active: true,
            veth_pairs: Vec::new(),
        })
    }

    /// Name of the pair the next [`Bridge::create_link`] call will create.
    ///
    /// Pairs are never removed from the list, so the attachment count keeps
    /// names unique for the bridge's lifetime.
    pub fn next_pair_name(&self) -> String {
        bridge_pair_name(&self.name, self.veth_pairs.len())
    }

    /// Connects the namespace slot `target` to the bridge through a new pair.
    ///
    /// The pair is recorded as soon as it exists, so a failed attach still
    /// leaves it where teardown can find it.
    #[instrument(skip(self, net, namespaces), fields(bridge = %self.name))]
    pub async fn create_link(
        &mut self,
        net: &dyn NetworkControl,
        namespaces: &mut [Namespace],
        target: SlotRef,
    ) -> TopologyResult<()> {
        let mut pair = VethPair::new(&self.next_pair_name());
        pair.create(net).await?;
        let index = self.veth_pairs.len();
        self.veth_pairs.push(pair);
        let pair = &mut self.veth_pairs[index];

        let Some(ns) = namespaces.get_mut(target.namespace) else {
            return Err(TopologyError::NoMatchingSlot {
                namespace: format!("#{}", target.namespace),
                endpoint: pair.left.name.clone(),
            });
        };

        ns.attach(net, target.slot, &mut pair.left).await?;
        net.attach_device_to_bridge(&self.name, &pair.right.name)
            .await?;

        info!("succeeded to attach {} to bridge {}", pair.right.name, self.name);
        Ok(())
    }

    /// Removes every attached pair, then the bridge.
    ///
    /// Pair failures are logged and skipped. Only a failure to delete the
    /// bridge itself is returned.
    #[instrument(skip(self, net), fields(bridge = %self.name))]
    pub async fn destroy(&mut self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if !self.active {
            info!("{} is already inactive", self.name);
            return Ok(());
        }

        for pair in self.veth_pairs.iter_mut().filter(|p| p.active) {
            if let Err(e) = pair.destroy(net).await {
                warn!(pair = %pair.label(), error = %e, "failed to delete veth pair");
            }
        }

        net.delete_bridge(&self.name).await?;
        self.active = false;
        info!("succeeded to delete bridge {}", self.name);
        Ok(())
    }
}
