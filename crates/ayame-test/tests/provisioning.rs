//! End-to-end provisioning tests against a recording runner

use ayame::{provision, BindingPolicy, TopologyError};
use ayame_test::{topology_fixtures, CommandVerifier, LabEnv, StateVerifier};

/// Scenario: two namespaces joined by one direct link
///
/// Produces one busy direct link, two namespaces with one configured slot
/// each, and no bridges.
#[tokio::test]
async fn test_two_namespaces_one_direct_link() {
    let env = LabEnv::new();
    let state = env
        .orchestrator
        .init_resources(&topology_fixtures::two_namespace_direct_link())
        .await
        .expect("provisioning failed");

    let v = StateVerifier::new(&state);
    v.assert_counts(1, 0, 2).unwrap();
    v.assert_busy("L1", true).unwrap();
    v.assert_slot("ns1", "L1", Some("L1-left")).unwrap();
    v.assert_slot("ns2", "L1", Some("L1-right")).unwrap();
    v.assert_configured_slots(2).unwrap();
}

#[tokio::test]
async fn test_creation_order() {
    let env = LabEnv::new();
    env.orchestrator
        .init_resources(&topology_fixtures::mixed())
        .await
        .unwrap();

    let commands = env.runner.commands();
    let v = CommandVerifier::new(&commands);
    v.assert_order("type veth peer L1-right", "add-br br0").unwrap();
    v.assert_order("add-br br0", "netns add ns1").unwrap();
    v.assert_order("netns add ns3", "L1-left netns ns1").unwrap();
    // Direct links bind before bridges
    v.assert_order("L1-right netns ns2", "br0-0-left netns ns1").unwrap();
    // Commands run last, with $(...) expanded
    v.assert_order("add-port br0 br0-2-right", "exec ns1 ip link set L1-left up")
        .unwrap();
    v.assert_issued("exec ns1 ip link set br0-0-left up").unwrap();
}

#[tokio::test]
async fn test_bridge_star() {
    let env = LabEnv::new();
    let state = env
        .orchestrator
        .init_resources(&topology_fixtures::bridge_star(4))
        .await
        .unwrap();

    let v = StateVerifier::new(&state);
    v.assert_counts(0, 1, 4).unwrap();
    v.assert_bridge_pairs("br0", 4).unwrap();
    for i in 0..4 {
        let endpoint = format!("br0-{}-left", i);
        v.assert_slot(&format!("ns{}", i + 1), "br0", Some(endpoint.as_str()))
            .unwrap();
    }
    CommandVerifier::new(&env.runner.commands())
        .assert_count("add-port br0", 4)
        .unwrap();
}

#[tokio::test]
async fn test_chain() {
    let env = LabEnv::new();
    let state = env
        .orchestrator
        .init_resources(&topology_fixtures::chain(4))
        .await
        .unwrap();

    let v = StateVerifier::new(&state);
    v.assert_counts(3, 0, 4).unwrap();
    v.assert_slot("ns2", "L1", Some("L1-right")).unwrap();
    v.assert_slot("ns2", "L2", Some("L2-left")).unwrap();
    v.assert_configured_slots(6).unwrap();
}

#[tokio::test]
async fn test_direct_link_cardinality() {
    for endpoints in 1..=3 {
        let env = LabEnv::new();
        let result = env
            .orchestrator
            .init_resources(&topology_fixtures::direct_link_with_endpoints(endpoints))
            .await;

        match endpoints {
            1 => assert!(matches!(
                result,
                Err(TopologyError::InsufficientEndpoints { found: 1, .. })
            )),
            2 => {
                let state = result.unwrap();
                assert!(state.direct_links[0].veth_pair.left.attached);
                assert!(state.direct_links[0].veth_pair.right.attached);
            }
            _ => assert!(matches!(
                result,
                Err(TopologyError::TooManyEndpoints { found: 3, .. })
            )),
        }
    }
}

/// Scenario: unmatched device, lenient coverage
///
/// The `L9` slot stays unconfigured and everything else is created.
#[tokio::test]
async fn test_unmatched_device_lenient() {
    let env = LabEnv::with_policy(BindingPolicy::lenient());
    let state = env
        .orchestrator
        .init_resources(&topology_fixtures::unmatched_device())
        .await
        .unwrap();

    let v = StateVerifier::new(&state);
    v.assert_counts(1, 0, 2).unwrap();
    v.assert_busy("L1", true).unwrap();
    v.assert_slot("ns1", "L9", None).unwrap();
    v.assert_slot("ns1", "L1", Some("L1-left")).unwrap();
}

/// Scenario: unmatched device, strict coverage
///
/// Binding fails before any slot is touched and everything is rolled back.
#[tokio::test]
async fn test_unmatched_device_strict() {
    let env = LabEnv::with_policy(BindingPolicy::strict());
    let err = env
        .orchestrator
        .init_resources(&topology_fixtures::unmatched_device())
        .await
        .unwrap_err();

    assert!(matches!(err, TopologyError::UnresolvedDevice { ref device, .. } if device == "L9"));
    let commands = env.runner.commands();
    let v = CommandVerifier::new(&commands);
    v.assert_not_issued("netns ns1").unwrap();
    v.assert_issued("link delete L1-left").unwrap();
    v.assert_count("netns delete", 2).unwrap();
}

#[tokio::test]
async fn test_provisioning_is_deterministic() {
    let first = LabEnv::new();
    let second = LabEnv::new();
    let topology = topology_fixtures::mixed();

    let a = provision(&first.network(), &topology, BindingPolicy::default())
        .await
        .unwrap();
    let b = provision(&second.network(), &topology, BindingPolicy::default())
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(first.runner.commands(), second.runner.commands());
}
