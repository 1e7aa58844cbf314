//! Persisted resource graph.
//!
//! The whole topology lives in one JSON document. A later invocation
//! rebuilds the in-memory graph from it and runs the same destroy
//! operations that provisioning rollback uses.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::direct_link::DirectLink;
use crate::error::{TopologyError, TopologyResult};
use crate::namespace::Namespace;

/// Directory under `$HOME` holding the state file.
pub const STATE_DIR: &str = ".ayame";

/// State file name.
pub const STATE_FILE: &str = "state.json";

/// Every resource of a provisioned topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Direct links in creation order.
    #[serde(default)]
    pub direct_links: Vec<DirectLink>,
    /// Bridges in creation order.
    #[serde(default)]
    pub bridges: Vec<Bridge>,
    /// Namespaces in creation order.
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
}

impl State {
    /// Returns true if the state holds no resources.
    pub fn is_empty(&self) -> bool {
        self.direct_links.is_empty() && self.bridges.is_empty() && self.namespaces.is_empty()
    }

    /// Pretty-printed JSON dump.
    pub fn dump_all(&self) -> TopologyResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| TopologyError::StateEncode { source })
    }

    /// JSON tree of the state, for structural comparison.
    pub fn to_value(&self) -> TopologyResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|source| TopologyError::StateEncode { source })
    }

    /// Parses a state document read from `path`.
    pub fn from_slice(path: &Path, bytes: &[u8]) -> TopologyResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TopologyError::CorruptState {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Reads and writes the state file at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.ayame/state.json`, or a relative `.ayame/state.json` when
    /// `HOME` is unset.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(STATE_DIR)
            .join(STATE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    /// Returns true if a state file is present.
    pub async fn exists(&self) -> TopologyResult<bool> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| TopologyError::state_io(self.display(), e))
    }

    /// Writes `state` as compact JSON, creating the parent directory.
    pub async fn save(&self, state: &State) -> TopologyResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TopologyError::state_io(parent.display().to_string(), e))?;
        }

        let bytes =
            serde_json::to_vec(state).map_err(|source| TopologyError::StateEncode { source })?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| TopologyError::state_io(self.display(), e))?;

        info!(path = %self.display(), "saved state");
        Ok(())
    }

    /// Reads the state file. `None` means there is no file.
    pub async fn load(&self) -> TopologyResult<Option<State>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.display(), "no state file");
                return Ok(None);
            }
            Err(e) => return Err(TopologyError::state_io(self.display(), e)),
        };

        State::from_slice(&self.path, &bytes).map(Some)
    }

    /// Deletes the state file.
    pub async fn remove(&self) -> TopologyResult<()> {
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| TopologyError::state_io(self.display(), e))?;
        info!(path = %self.display(), "removed state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::DeviceSlot;
    use crate::veth::VethPair;
    use pretty_assertions::assert_eq;

    fn sample_state() -> State {
        let mut pair = VethPair::new("L1");
        pair.active = true;
        pair.left.attached = true;
        pair.right.attached = true;

        let mut br_pair = VethPair::new("br0-0");
        br_pair.active = true;
        br_pair.left.attached = true;

        let mut slot = DeviceSlot::new("L1", "10.0.0.1/24");
        slot.attached_veth = Some("L1-left".to_string());

        State {
            direct_links: vec![DirectLink {
                name: "L1".to_string(),
                veth_pair: pair,
                busy: true,
            }],
            bridges: vec![
                Bridge {
                    name: "br0".to_string(),
                    active: true,
                    veth_pairs: vec![br_pair],
                },
                Bridge {
                    name: "br1".to_string(),
                    active: true,
                    veth_pairs: vec![],
                },
            ],
            namespaces: vec![
                Namespace {
                    name: "ns1".to_string(),
                    devices: vec![slot, DeviceSlot::new("L9", "10.9.0.1/24")],
                },
                Namespace {
                    name: "ns2".to_string(),
                    devices: vec![],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join(STATE_FILE));
        let state = sample_state();

        store.save(&state).await.unwrap();
        assert!(store.exists().await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_empty_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join(STATE_FILE));

        store.save(&State::default()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join(STATE_FILE));

        assert!(!store.exists().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        std::fs::write(&path, b"{not json").unwrap();

        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TopologyError::CorruptState { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join(STATE_FILE));
        store.save(&State::default()).await.unwrap();

        store.remove().await.unwrap();
        assert!(!store.exists().await.unwrap());
    }

    #[test]
    fn test_json_keys() {
        let value = sample_state().to_value().unwrap();
        assert_eq!(value["direct_links"][0]["veth_pair"]["left"]["name"], "L1-left");
        assert_eq!(value["direct_links"][0]["busy"], true);
        assert_eq!(value["bridges"][0]["veth_pairs"][0]["right"]["attached"], false);
        assert_eq!(value["namespaces"][0]["devices"][0]["attached_veth"], "L1-left");
        assert!(value["namespaces"][0]["devices"][1]["attached_veth"].is_null());
    }

    #[test]
    fn test_dump_is_pretty() {
        let dump = State::default().dump_all().unwrap();
        assert_eq!(
            dump,
            "{\n  \"direct_links\": [],\n  \"bridges\": [],\n  \"namespaces\": []\n}"
        );
    }
}
