//! ayame - network lab builder
//!
//! Provisions isolated topologies on a single host from a declarative
//! description: network namespaces, point-to-point veth links between
//! them and OVS bridges serving any number of them. The provisioned
//! resource graph is saved as JSON so a later invocation can inspect or
//! tear it down.
//!
//! Provisioning order is direct links, bridges, namespaces, then bindings.
//! A failure at any step rolls back everything created so far.

pub mod binding;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod direct_link;
pub mod error;
pub mod link;
pub mod namespace;
pub mod net;
pub mod orchestrator;
pub mod scenario;
pub mod state;
pub mod teardown;
pub mod veth;

pub use binding::{BindingPolicy, Coverage};
pub use bridge::Bridge;
pub use config::{DeviceConfig, LinkConfig, LinkMode, NamespaceConfig, TopologyConfig};
pub use direct_link::DirectLink;
pub use error::{ResourceKind, TopologyError, TopologyResult};
pub use link::Link;
pub use namespace::{DeviceSlot, Namespace, SlotRef};
pub use net::{BridgeControl, HostNetwork, LinkControl, NamespaceControl, NetworkControl};
pub use orchestrator::{provision, Orchestrator};
pub use scenario::{Scenario, ScenarioOutcome, ScenarioSummary};
pub use state::{State, StateStore};
pub use teardown::{TeardownFailure, TeardownReport};
pub use veth::{Veth, VethPair};
