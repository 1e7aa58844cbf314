//! Best-effort teardown with aggregated failures.
//!
//! Teardown never stops at the first error: every resource gets its
//! destroy attempt, and each failure is recorded with the kind and name of
//! the resource that produced it.

use std::fmt;
use tracing::{info, warn};

use crate::error::{ResourceKind, TopologyError};
use crate::net::NetworkControl;
use crate::state::State;

/// One resource that failed to tear down.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Name of the resource.
    pub name: String,
    /// Error returned by its destroy operation.
    pub error: TopologyError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.name, self.error)
    }
}

/// Ordered collection of teardown failures.
#[derive(Debug, Default)]
pub struct TeardownReport {
    failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure and logs it.
    pub fn record(&mut self, kind: ResourceKind, name: impl Into<String>, error: TopologyError) {
        let name = name.into();
        warn!(kind = %kind, name = %name, error = %error, "teardown failed");
        self.failures.push(TeardownFailure { kind, name, error });
    }

    /// Returns true if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failures in the order they happened.
    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    /// Converts a non-empty report into an error.
    pub fn into_result(self) -> Result<(), TopologyError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TopologyError::Teardown(self))
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return f.write_str("no failures");
        }
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownReport {}

/// Destroys every resource in `state`: direct links, then bridges, then
/// namespaces.
///
/// Direct links that were never bound are released too, so a rollback
/// leaves no stray veth pairs behind.
pub async fn teardown_state(net: &dyn NetworkControl, state: &mut State) -> TeardownReport {
    let mut report = TeardownReport::new();

    for link in &mut state.direct_links {
        if let Err(e) = link.release(net).await {
            report.record(ResourceKind::DirectLink, &link.name, e);
        }
    }

    for bridge in &mut state.bridges {
        if let Err(e) = bridge.destroy(net).await {
            report.record(ResourceKind::Bridge, &bridge.name, e);
        }
    }

    for ns in &state.namespaces {
        if let Err(e) = ns.destroy(net).await {
            report.record(ResourceKind::Namespace, &ns.name, e);
        }
    }

    info!(failures = report.len(), "teardown finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::{LinkConfig, NamespaceConfig};
    use crate::direct_link::DirectLink;
    use crate::namespace::Namespace;
    use crate::net::HostNetwork;
    use ayame_common::RecordingRunner;
    use std::sync::Arc;

    fn recording() -> (Arc<RecordingRunner>, HostNetwork) {
        let runner = Arc::new(RecordingRunner::new());
        (runner.clone(), HostNetwork::new(runner))
    }

    async fn unbound_state(net: &HostNetwork) -> State {
        State {
            direct_links: vec![DirectLink::init(&LinkConfig::direct("L1"), net).await.unwrap()],
            bridges: vec![Bridge::init(&LinkConfig::bridge("br0"), net).await.unwrap()],
            namespaces: vec![
                Namespace::init(&NamespaceConfig::new("ns1"), net).await.unwrap(),
                Namespace::init(&NamespaceConfig::new("ns2"), net).await.unwrap(),
            ],
        }
    }

    #[test]
    fn test_report_display() {
        let mut report = TeardownReport::new();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "no failures");

        report.record(
            ResourceKind::Bridge,
            "br0",
            TopologyError::invalid_config("x", "y"),
        );
        report.record(
            ResourceKind::Namespace,
            "ns1",
            TopologyError::NotBusy {
                link: "L1".to_string(),
            },
        );
        assert_eq!(report.len(), 2);
        assert_eq!(
            report.to_string(),
            "bridge 'br0': Invalid configuration for x: y; namespace 'ns1': Direct link 'L1' is not busy"
        );
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let (runner, net) = recording();
        let mut state = unbound_state(&net).await;
        runner.clear();

        let report = teardown_state(&net, &mut state).await;
        assert!(report.is_empty());
        assert_eq!(
            runner.commands(),
            vec![
                "/sbin/ip link delete L1-left",
                "/usr/bin/ovs-vsctl del-br br0",
                "/sbin/ip netns pids ns1",
                "/sbin/ip netns delete ns1",
                "/sbin/ip netns pids ns2",
                "/sbin/ip netns delete ns2",
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_aggregates_every_failure() {
        let (runner, net) = recording();
        let mut state = unbound_state(&net).await;
        runner.clear();
        runner.fail_on("del-br br0");
        runner.fail_on("netns delete ns1");

        let report = teardown_state(&net, &mut state).await;
        let failed: Vec<_> = report
            .failures()
            .iter()
            .map(|f| (f.kind, f.name.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![(ResourceKind::Bridge, "br0"), (ResourceKind::Namespace, "ns1")]
        );
        // ns2 is still attempted after ns1 failed
        assert_eq!(runner.count_matching("netns delete ns2"), 1);
    }

    #[tokio::test]
    async fn test_teardown_twice_is_noop_for_links_and_bridges() {
        let (runner, net) = recording();
        let mut state = unbound_state(&net).await;
        teardown_state(&net, &mut state).await;
        runner.clear();

        let report = teardown_state(&net, &mut state).await;
        assert!(report.is_empty());
        assert_eq!(runner.count_matching("link delete"), 0);
        assert_eq!(runner.count_matching("del-br"), 0);
    }
}
