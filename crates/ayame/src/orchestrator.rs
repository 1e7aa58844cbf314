//! Top-level provisioning and disposal.
//!
//! Provisioning runs in a fixed order: direct links, bridges, namespaces,
//! bindings, then each namespace's commands. If any step before the
//! commands fails, everything created so far is torn down and the error
//! that triggered the rollback is returned.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::binding::{self, BindingPolicy};
use crate::bridge::Bridge;
use crate::config::TopologyConfig;
use crate::direct_link::DirectLink;
use crate::error::{TopologyError, TopologyResult};
use crate::namespace::Namespace;
use crate::net::NetworkControl;
use crate::state::{State, StateStore};
use crate::teardown::teardown_state;

/// Creates every resource of `topology`, rolling back on failure.
///
/// Does not look at any state file.
#[instrument(skip(net, topology), fields(links = topology.links.len(), namespaces = topology.namespaces.len()))]
pub async fn provision(
    net: &dyn NetworkControl,
    topology: &TopologyConfig,
    policy: BindingPolicy,
) -> TopologyResult<State> {
    let mut state = State::default();

    if let Err(e) = build(net, topology, policy, &mut state).await {
        error!(error = %e, "provisioning failed, rolling back");
        let report = teardown_state(net, &mut state).await;
        if !report.is_empty() {
            warn!(failures = report.len(), report = %report, "rollback incomplete");
        }
        return Err(e);
    }

    for (ns, config) in state.namespaces.iter().zip(&topology.namespaces) {
        let failed = ns.run_commands(net, &config.commands).await;
        if failed > 0 {
            warn!(namespace = %ns.name, failed = failed, "some commands failed");
        }
    }

    info!("provisioning complete");
    Ok(state)
}

async fn build(
    net: &dyn NetworkControl,
    topology: &TopologyConfig,
    policy: BindingPolicy,
    state: &mut State,
) -> TopologyResult<()> {
    for config in topology.direct_links() {
        state.direct_links.push(DirectLink::init(config, net).await?);
    }
    for config in topology.bridges() {
        state.bridges.push(Bridge::init(config, net).await?);
    }
    for config in &topology.namespaces {
        state.namespaces.push(Namespace::init(config, net).await?);
    }
    binding::resolve(net, state, policy).await
}

/// Provisions and disposes topologies backed by a state file.
pub struct Orchestrator {
    net: Arc<dyn NetworkControl>,
    store: StateStore,
    policy: BindingPolicy,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(net: Arc<dyn NetworkControl>, store: StateStore) -> Self {
        Self {
            net,
            store,
            policy: BindingPolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_policy(mut self, policy: BindingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// In dry-run mode a successful dispose keeps the state file.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Provisions `topology` unless a state file already exists.
    ///
    /// The returned state is not saved; see [`Orchestrator::save_state`].
    #[instrument(skip(self, topology))]
    pub async fn init_resources(&self, topology: &TopologyConfig) -> TopologyResult<State> {
        if self.store.exists().await? {
            return Err(TopologyError::AlreadyProvisioned {
                path: self.store.path().display().to_string(),
            });
        }

        provision(self.net.as_ref(), topology, self.policy).await
    }

    /// Tears down the saved topology and removes the state file.
    ///
    /// The file stays in place if any resource failed to tear down.
    #[instrument(skip(self))]
    pub async fn dispose_resources(&self) -> TopologyResult<()> {
        let Some(mut state) = self.store.load().await? else {
            return Err(TopologyError::NoSavedState {
                path: self.store.path().display().to_string(),
            });
        };

        teardown_state(self.net.as_ref(), &mut state)
            .await
            .into_result()?;

        if self.dry_run {
            info!(path = %self.store.path().display(), "dry run, keeping state file");
            return Ok(());
        }
        self.store.remove().await
    }

    /// Loads the saved topology, if any.
    pub async fn load_resources(&self) -> TopologyResult<Option<State>> {
        self.store.load().await
    }

    pub async fn save_state(&self, state: &State) -> TopologyResult<()> {
        self.store.save(state).await
    }
}
