//! Closed set of attachable link kinds

use crate::bridge::Bridge;
use crate::direct_link::DirectLink;
use crate::error::{ResourceKind, TopologyError, TopologyResult};
use crate::namespace::{Namespace, SlotRef};
use crate::net::NetworkControl;

/// A link or bridge that namespace slots can be bound to
#[derive(Debug)]
pub enum Link<'a> {
    Direct(&'a mut DirectLink),
    Bridge(&'a mut Bridge),
}

impl Link<'_> {
    pub fn name(&self) -> &str {
        match self {
            Link::Direct(link) => &link.name,
            Link::Bridge(bridge) => &bridge.name,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Link::Direct(_) => ResourceKind::DirectLink,
            Link::Bridge(_) => ResourceKind::Bridge,
        }
    }

    /// Bind every slot in `targets` to this link.
    ///
    /// A direct link takes exactly two targets, left end first. A bridge
    /// takes any number and gets one pair per target, in order.
    pub async fn create_link(
        &mut self,
        net: &dyn NetworkControl,
        namespaces: &mut [Namespace],
        targets: &[SlotRef],
    ) -> TopologyResult<()> {
        match self {
            Link::Direct(link) => match *targets {
                [left, right] => link.create_link(net, namespaces, left, right).await,
                _ if targets.len() < 2 => Err(TopologyError::InsufficientEndpoints {
                    link: link.name.clone(),
                    found: targets.len(),
                }),
                _ => Err(TopologyError::TooManyEndpoints {
                    link: link.name.clone(),
                    found: targets.len(),
                }),
            },
            Link::Bridge(bridge) => {
                for target in targets {
                    bridge.create_link(net, namespaces, *target).await?;
                }
                Ok(())
            }
        }
    }
}
