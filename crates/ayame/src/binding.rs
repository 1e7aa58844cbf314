//! Binding resolution: which link or bridge serves which namespace slots.
//!
//! Unconfigured slots are grouped by the device name they declare. Each
//! group is then matched against the declared direct links and bridges
//! and bound through [`Link::create_link`]. Everything is walked in
//! declaration order, so the same topology always yields the same command
//! sequence: direct links first, then bridges, each group's slots in
//! namespace order.

use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::error::{TopologyError, TopologyResult};
use crate::link::Link;
use crate::namespace::SlotRef;
use crate::net::NetworkControl;
use crate::state::State;

/// What happens to slots whose device name matches no link or bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Coverage {
    /// Leave them unconfigured and bind everything else.
    #[default]
    Lenient,
    /// Fail with `UnresolvedDevice` before binding anything.
    Strict,
}

/// Binding resolver settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingPolicy {
    pub coverage: Coverage,
}

impl BindingPolicy {
    pub fn lenient() -> Self {
        Self {
            coverage: Coverage::Lenient,
        }
    }

    pub fn strict() -> Self {
        Self {
            coverage: Coverage::Strict,
        }
    }
}

/// Index of the link serving a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Index into `State::direct_links`.
    Direct(usize),
    /// Index into `State::bridges`.
    Bridge(usize),
}

/// Slots sharing one device name, with the link that serves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingGroup {
    pub device: String,
    pub target: LinkTarget,
    pub slots: Vec<SlotRef>,
}

/// Result of grouping a state's unconfigured slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingPlan {
    /// Groups to bind, direct links first.
    pub groups: Vec<BindingGroup>,
    /// Slots no declared link or bridge serves, with their device name.
    pub unresolved: Vec<(SlotRef, String)>,
}

/// Groups the unconfigured slots of `state` by device name.
pub fn plan(state: &State) -> BindingPlan {
    let mut order: Vec<&str> = Vec::new();
    let mut by_device: HashMap<&str, Vec<SlotRef>> = HashMap::new();

    for (ns_index, ns) in state.namespaces.iter().enumerate() {
        for (slot_index, slot) in ns.devices.iter().enumerate() {
            if slot.is_configured() {
                continue;
            }
            let entry = by_device.entry(slot.name.as_str()).or_default();
            if entry.is_empty() {
                order.push(slot.name.as_str());
            }
            entry.push(SlotRef::new(ns_index, slot_index));
        }
    }

    let mut plan = BindingPlan::default();

    for (i, link) in state.direct_links.iter().enumerate() {
        if let Some(slots) = by_device.remove(link.name.as_str()) {
            plan.groups.push(BindingGroup {
                device: link.name.clone(),
                target: LinkTarget::Direct(i),
                slots,
            });
        }
    }

    for (i, bridge) in state.bridges.iter().enumerate() {
        if let Some(slots) = by_device.remove(bridge.name.as_str()) {
            plan.groups.push(BindingGroup {
                device: bridge.name.clone(),
                target: LinkTarget::Bridge(i),
                slots,
            });
        }
    }

    for device in order {
        if let Some(slots) = by_device.remove(device) {
            plan.unresolved
                .extend(slots.into_iter().map(|slot| (slot, device.to_string())));
        }
    }

    plan
}

/// Binds every resolvable slot of `state`.
///
/// Fails fast on the first binding or primitive error; the caller is
/// expected to roll back.
#[instrument(skip(net, state))]
pub async fn resolve(
    net: &dyn NetworkControl,
    state: &mut State,
    policy: BindingPolicy,
) -> TopologyResult<()> {
    let plan = plan(state);

    if policy.coverage == Coverage::Strict {
        if let Some((slot, device)) = plan.unresolved.first() {
            return Err(TopologyError::UnresolvedDevice {
                namespace: state
                    .namespaces
                    .get(slot.namespace)
                    .map(|ns| ns.name.clone())
                    .unwrap_or_default(),
                device: device.clone(),
            });
        }
    }
    for (slot, device) in &plan.unresolved {
        if let Some(ns) = state.namespaces.get(slot.namespace) {
            warn!(namespace = %ns.name, device = %device, "no link or bridge for device, leaving it unconfigured");
        }
    }

    for group in &plan.groups {
        let mut link = match group.target {
            LinkTarget::Direct(i) => match state.direct_links.get_mut(i) {
                Some(link) => Link::Direct(link),
                None => continue,
            },
            LinkTarget::Bridge(i) => match state.bridges.get_mut(i) {
                Some(bridge) => Link::Bridge(bridge),
                None => continue,
            },
        };
        link.create_link(net, &mut state.namespaces, &group.slots)
            .await?;
        info!(link = %link.name(), kind = %link.kind(), slots = group.slots.len(), "bound");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::{LinkConfig, LinkMode, NamespaceConfig};
    use crate::direct_link::DirectLink;
    use crate::namespace::Namespace;
    use crate::net::HostNetwork;
    use ayame_common::RecordingRunner;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn recording() -> (Arc<RecordingRunner>, HostNetwork) {
        let runner = Arc::new(RecordingRunner::new());
        (runner.clone(), HostNetwork::new(runner))
    }

    async fn build(net: &HostNetwork, links: &[LinkConfig], namespaces: &[NamespaceConfig]) -> State {
        let mut state = State::default();
        for link in links {
            match link.mode {
                LinkMode::DirectLink => {
                    state.direct_links.push(DirectLink::init(link, net).await.unwrap())
                }
                LinkMode::Bridge => {
                    state.bridges.push(Bridge::init(link, net).await.unwrap())
                }
            }
        }
        for ns in namespaces {
            state.namespaces.push(Namespace::from_config(ns));
        }
        state
    }

    #[tokio::test]
    async fn test_plan_orders_direct_links_before_bridges() {
        let (_runner, net) = recording();
        let state = build(
            &net,
            &[LinkConfig::bridge("br0"), LinkConfig::direct("L1")],
            &[
                NamespaceConfig::new("ns1")
                    .with_device("br0", "192.168.0.1/24")
                    .with_device("L1", "10.0.0.1/24"),
                NamespaceConfig::new("ns2")
                    .with_device("L9", "10.9.0.1/24")
                    .with_device("L1", "10.0.0.2/24"),
                NamespaceConfig::new("ns3").with_device("br0", "192.168.0.3/24"),
            ],
        )
        .await;

        let plan = plan(&state);
        assert_eq!(
            plan.groups,
            vec![
                BindingGroup {
                    device: "L1".to_string(),
                    target: LinkTarget::Direct(0),
                    slots: vec![SlotRef::new(0, 1), SlotRef::new(1, 1)],
                },
                BindingGroup {
                    device: "br0".to_string(),
                    target: LinkTarget::Bridge(0),
                    slots: vec![SlotRef::new(0, 0), SlotRef::new(2, 0)],
                },
            ]
        );
        assert_eq!(plan.unresolved, vec![(SlotRef::new(1, 0), "L9".to_string())]);
    }

    #[tokio::test]
    async fn test_plan_skips_configured_slots() {
        let (_runner, net) = recording();
        let mut state = build(
            &net,
            &[LinkConfig::direct("L1")],
            &[NamespaceConfig::new("ns1").with_device("L1", "10.0.0.1/24")],
        )
        .await;
        state.namespaces[0].devices[0].attached_veth = Some("L1-left".to_string());

        assert_eq!(plan(&state), BindingPlan::default());
    }

    #[tokio::test]
    async fn test_resolve_same_namespace_direct_link() {
        let (_runner, net) = recording();
        let mut state = build(
            &net,
            &[LinkConfig::direct("L1")],
            &[NamespaceConfig::new("ns1")
                .with_device("L1", "10.0.0.1/24")
                .with_device("L1", "10.0.0.2/24")],
        )
        .await;

        resolve(&net, &mut state, BindingPolicy::default())
            .await
            .unwrap();
        assert!(state.direct_links[0].busy);
        assert_eq!(state.namespaces[0].configured_slots(), 2);
        assert_eq!(
            state.namespaces[0].devices[1].attached_veth.as_deref(),
            Some("L1-right")
        );
    }

    #[tokio::test]
    async fn test_resolve_lenient_leaves_unmatched_slot() {
        let (_runner, net) = recording();
        let mut state = build(
            &net,
            &[LinkConfig::direct("L1")],
            &[
                NamespaceConfig::new("ns1")
                    .with_device("L9", "10.9.0.1/24")
                    .with_device("L1", "10.0.0.1/24"),
                NamespaceConfig::new("ns2").with_device("L1", "10.0.0.2/24"),
            ],
        )
        .await;

        resolve(&net, &mut state, BindingPolicy::lenient())
            .await
            .unwrap();
        assert!(state.direct_links[0].busy);
        assert!(!state.namespaces[0].devices[0].is_configured());
        assert!(state.namespaces[0].devices[1].is_configured());
    }

    #[tokio::test]
    async fn test_resolve_strict_fails_before_binding() {
        let (runner, net) = recording();
        let mut state = build(
            &net,
            &[LinkConfig::direct("L1")],
            &[
                NamespaceConfig::new("ns1")
                    .with_device("L9", "10.9.0.1/24")
                    .with_device("L1", "10.0.0.1/24"),
                NamespaceConfig::new("ns2").with_device("L1", "10.0.0.2/24"),
            ],
        )
        .await;
        runner.clear();

        let err = resolve(&net, &mut state, BindingPolicy::strict())
            .await
            .unwrap_err();
        match err {
            TopologyError::UnresolvedDevice { namespace, device } => {
                assert_eq!(namespace, "ns1");
                assert_eq!(device, "L9");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(runner.commands().is_empty());
        assert!(!state.direct_links[0].busy);
    }

    #[tokio::test]
    async fn test_resolve_insufficient_endpoints() {
        let (_runner, net) = recording();
        let mut state = build(
            &net,
            &[LinkConfig::direct("L1")],
            &[NamespaceConfig::new("ns1").with_device("L1", "10.0.0.1/24")],
        )
        .await;

        let err = resolve(&net, &mut state, BindingPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InsufficientEndpoints { found: 1, .. }));
    }
}
