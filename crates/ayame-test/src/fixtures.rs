//! Test fixtures for common topology shapes
//!
//! Everything here runs against a [`RecordingRunner`]; no host state is
//! touched.

use std::sync::Arc;

use ayame::{
    BindingPolicy, HostNetwork, LinkConfig, NamespaceConfig, Orchestrator, StateStore,
    TopologyConfig,
};
use ayame_common::RecordingRunner;
use tempfile::TempDir;

/// Builder for [`TopologyConfig`]
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    config: TopologyConfig,
}

impl TopologyBuilder {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a direct link
    pub fn direct(mut self, name: impl Into<String>) -> Self {
        self.config.links.push(LinkConfig::direct(name));
        self
    }

    /// Declare a bridge
    pub fn bridge(mut self, name: impl Into<String>) -> Self {
        self.config.links.push(LinkConfig::bridge(name));
        self
    }

    /// Declare a namespace
    pub fn namespace(mut self, ns: NamespaceConfig) -> Self {
        self.config.namespaces.push(ns);
        self
    }

    /// Finish the topology
    pub fn build(self) -> TopologyConfig {
        self.config
    }
}

/// Common topology fixtures
pub mod topology_fixtures {
    use super::*;

    /// `ns1 --L1-- ns2`
    pub fn two_namespace_direct_link() -> TopologyConfig {
        TopologyBuilder::new()
            .direct("L1")
            .namespace(NamespaceConfig::new("ns1").with_device("L1", "10.0.0.1/24"))
            .namespace(NamespaceConfig::new("ns2").with_device("L1", "10.0.0.2/24"))
            .build()
    }

    /// `n` namespaces all attached to bridge `br0`
    pub fn bridge_star(n: usize) -> TopologyConfig {
        (0..n)
            .fold(TopologyBuilder::new().bridge("br0"), |b, i| {
                b.namespace(
                    NamespaceConfig::new(format!("ns{}", i + 1))
                        .with_device("br0", format!("192.168.0.{}/24", i + 1)),
                )
            })
            .build()
    }

    /// `n` namespaces in a line, neighbours joined by `L<i>`
    pub fn chain(n: usize) -> TopologyConfig {
        let mut builder = TopologyBuilder::new();
        for i in 1..n {
            builder = builder.direct(format!("L{}", i));
        }
        for i in 1..=n {
            let mut ns = NamespaceConfig::new(format!("ns{}", i));
            if i > 1 {
                ns = ns.with_device(format!("L{}", i - 1), format!("10.0.{}.2/24", i - 1));
            }
            if i < n {
                ns = ns.with_device(format!("L{}", i), format!("10.0.{}.1/24", i));
            }
            builder = builder.namespace(ns);
        }
        builder.build()
    }

    /// `L1` referenced by `n` namespaces
    pub fn direct_link_with_endpoints(n: usize) -> TopologyConfig {
        (0..n)
            .fold(TopologyBuilder::new().direct("L1"), |b, i| {
                b.namespace(
                    NamespaceConfig::new(format!("ns{}", i + 1))
                        .with_device("L1", format!("10.0.0.{}/24", i + 1)),
                )
            })
            .build()
    }

    /// Two-namespace link where `ns1` also declares a device `L9` that no
    /// link or bridge serves
    pub fn unmatched_device() -> TopologyConfig {
        TopologyBuilder::new()
            .direct("L1")
            .namespace(
                NamespaceConfig::new("ns1")
                    .with_device("L9", "10.9.0.1/24")
                    .with_device("L1", "10.0.0.1/24"),
            )
            .namespace(NamespaceConfig::new("ns2").with_device("L1", "10.0.0.2/24"))
            .build()
    }

    /// A direct link, a bridge and three namespaces using both
    pub fn mixed() -> TopologyConfig {
        TopologyBuilder::new()
            .direct("L1")
            .bridge("br0")
            .namespace(
                NamespaceConfig::new("ns1")
                    .with_device("L1", "10.0.0.1/24")
                    .with_device("br0", "192.168.0.1/24")
                    .with_command("ip link set $(L1) up")
                    .with_command("ip link set $(br0) up"),
            )
            .namespace(
                NamespaceConfig::new("ns2")
                    .with_device("L1", "10.0.0.2/24")
                    .with_device("br0", "192.168.0.2/24"),
            )
            .namespace(NamespaceConfig::new("ns3").with_device("br0", "192.168.0.3/24"))
            .build()
    }
}

/// Orchestrator over a recording runner with a state file in a temp dir
pub struct LabEnv {
    pub runner: Arc<RecordingRunner>,
    pub orchestrator: Orchestrator,
    _dir: TempDir,
}

impl LabEnv {
    /// Create an environment with the default binding policy
    pub fn new() -> Self {
        Self::with_policy(BindingPolicy::default())
    }

    /// Create an environment with `policy`
    pub fn with_policy(policy: BindingPolicy) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(RecordingRunner::new());
        let orchestrator = Orchestrator::new(
            Arc::new(HostNetwork::new(runner.clone())),
            StateStore::new(dir.path().join("state.json")),
        )
        .with_policy(policy);

        Self {
            runner,
            orchestrator,
            _dir: dir,
        }
    }

    /// Network capabilities sharing this environment's runner
    pub fn network(&self) -> HostNetwork {
        HostNetwork::new(self.runner.clone())
    }
}

impl Default for LabEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::topology_fixtures::*;

    #[test]
    fn test_fixtures_validate() {
        assert!(two_namespace_direct_link().validate().is_ok());
        assert!(bridge_star(4).validate().is_ok());
        assert!(chain(4).validate().is_ok());
        assert!(mixed().validate().is_ok());
        assert!(unmatched_device().validate().is_err());
    }

    #[test]
    fn test_chain_shape() {
        let cfg = chain(3);
        assert_eq!(cfg.links.len(), 2);
        assert_eq!(cfg.namespaces[0].devices.len(), 1);
        assert_eq!(cfg.namespaces[1].devices.len(), 2);
        assert_eq!(cfg.namespaces[2].devices[0].name, "L2");
    }
}
