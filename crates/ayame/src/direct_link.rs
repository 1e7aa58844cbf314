//! Point-to-point links between two namespaces

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{LinkConfig, LinkMode};
use crate::error::{TopologyError, TopologyResult};
use crate::namespace::{Namespace, SlotRef};
use crate::net::NetworkControl;
use crate::veth::{Veth, VethPair};

/// A veth pair wiring exactly two namespace slots together
///
/// A direct link is bound at most once: `busy` flips to true only after
/// both endpoints have been attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectLink {
    /// Link name as declared
    pub name: String,
    /// The underlying pair (`<name>-left` / `<name>-right`)
    pub veth_pair: VethPair,
    /// Whether both endpoints have been attached
    pub busy: bool,
}

impl DirectLink {
    /// Create the link's veth pair on the host
    #[instrument(skip(config, net), fields(link = %config.name))]
    pub async fn init(config: &LinkConfig, net: &dyn NetworkControl) -> TopologyResult<Self> {
        if config.mode != LinkMode::DirectLink {
            return Err(TopologyError::InvalidMode {
                name: config.name.clone(),
                expected: LinkMode::DirectLink.to_string(),
                actual: config.mode.to_string(),
            });
        }

        let mut veth_pair = VethPair::new(&config.name);
        veth_pair.create(net).await?;

        Ok(Self {
            name: config.name.clone(),
            veth_pair,
            busy: false,
        })
    }

    /// Attach the left endpoint to `left` and the right endpoint to `right`
    ///
    /// If the right attach fails after the left one succeeded, the link is
    /// left half-attached and the error is returned as-is; provisioning
    /// rollback removes the pair through its still-detached end.
    #[instrument(skip(self, net, namespaces), fields(link = %self.name))]
    pub async fn create_link(
        &mut self,
        net: &dyn NetworkControl,
        namespaces: &mut [Namespace],
        left: SlotRef,
        right: SlotRef,
    ) -> TopologyResult<()> {
        if self.busy {
            return Err(TopologyError::AlreadyBusy {
                link: self.name.clone(),
            });
        }

        attach_to(net, namespaces, left, &mut self.veth_pair.left).await?;
        attach_to(net, namespaces, right, &mut self.veth_pair.right).await?;

        self.busy = true;
        info!("succeeded to link {}", self.name);
        Ok(())
    }

    /// Remove a bound link's veth pair
    ///
    /// A link whose pair is already gone is left alone. A link that never
    /// completed [`DirectLink::create_link`] fails with `NotBusy`; use
    /// [`DirectLink::release`] to clean it up.
    #[instrument(skip(self, net), fields(link = %self.name))]
    pub async fn destroy(&mut self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if !self.veth_pair.active {
            info!("{} is already inactive", self.name);
            return Ok(());
        }
        if !self.busy {
            return Err(TopologyError::NotBusy {
                link: self.name.clone(),
            });
        }

        self.veth_pair.destroy(net).await
    }

    /// Remove the link's veth pair whether or not it was ever bound
    ///
    /// Teardown goes through here so that links created but never bound,
    /// or only half bound, do not outlive a rollback.
    #[instrument(skip(self, net), fields(link = %self.name))]
    pub async fn release(&mut self, net: &dyn NetworkControl) -> TopologyResult<()> {
        if self.busy || !self.veth_pair.active {
            return self.destroy(net).await;
        }

        warn!("direct link {} was never bound", self.name);
        self.veth_pair.destroy(net).await
    }
}

async fn attach_to(
    net: &dyn NetworkControl,
    namespaces: &mut [Namespace],
    target: SlotRef,
    endpoint: &mut Veth,
) -> TopologyResult<()> {
    match namespaces.get_mut(target.namespace) {
        Some(ns) => ns.attach(net, target.slot, endpoint).await,
        None => Err(TopologyError::NoMatchingSlot {
            namespace: format!("#{}", target.namespace),
            endpoint: endpoint.name.clone(),
        }),
    }
}
