//! Error types for topology provisioning and teardown.
//!
//! Errors fall into four groups: configuration errors (bad link mode,
//! duplicate or dangling names), binding errors (endpoint cardinality and
//! slot bookkeeping), primitive errors (a host command failed) and state
//! errors (state file present, absent or unreadable). Teardown never stops
//! at the first failure, so it reports a [`TeardownReport`] instead.

use ayame_common::ShellError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::teardown::TeardownReport;

/// Result type alias for engine operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Kinds of resources the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A point-to-point link between two namespaces.
    DirectLink,
    /// An OVS bridge and its attached veth pairs.
    Bridge,
    /// A network namespace.
    Namespace,
}

impl ResourceKind {
    /// Returns the kind as used in log and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::DirectLink => "direct link",
            ResourceKind::Bridge => "bridge",
            ResourceKind::Namespace => "namespace",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while provisioning or tearing down a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A link was initialised with the wrong mode.
    #[error("Invalid link mode for '{name}': expected {expected}, got {actual}")]
    InvalidMode {
        /// The link name.
        name: String,
        /// The mode the constructor handles.
        expected: String,
        /// The mode found in the configuration.
        actual: String,
    },

    /// Topology description failed validation.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A veth pair was created twice.
    #[error("veth pair {pair} is already created")]
    AlreadyActive {
        /// The pair as `left@right`.
        pair: String,
    },

    /// A veth pair was destroyed without being created.
    #[error("veth pair {pair} doesn't exist")]
    NotActive {
        /// The pair as `left@right`.
        pair: String,
    },

    /// A direct link was bound a second time.
    #[error("Direct link '{link}' is already busy")]
    AlreadyBusy {
        /// The link name.
        link: String,
    },

    /// A direct link was destroyed without ever being bound.
    #[error("Direct link '{link}' is not busy")]
    NotBusy {
        /// The link name.
        link: String,
    },

    /// An endpoint that already sits in a namespace was attached again.
    #[error("Endpoint '{endpoint}' is already attached")]
    AlreadyAttached {
        /// The endpoint name.
        endpoint: String,
    },

    /// No device slot of the namespace can take the endpoint.
    #[error("Namespace '{namespace}' has no device slot for '{endpoint}'")]
    NoMatchingSlot {
        /// The namespace name.
        namespace: String,
        /// The endpoint name.
        endpoint: String,
    },

    /// The selected slot already holds an endpoint.
    #[error("Device slot '{slot}' of namespace '{namespace}' is already configured with '{endpoint}'")]
    SlotAlreadyConfigured {
        /// The namespace name.
        namespace: String,
        /// The slot name.
        slot: String,
        /// The endpoint currently in the slot.
        endpoint: String,
    },

    /// A slot's address could not be parsed.
    #[error("Failed to parse CIDR '{cidr}': {message}")]
    InvalidCidr {
        /// The CIDR string as declared.
        cidr: String,
        /// Parser message.
        message: String,
    },

    /// A direct link is referenced by fewer than two slots.
    #[error("Direct link '{link}' needs 2 endpoints, found {found}")]
    InsufficientEndpoints {
        /// The link name.
        link: String,
        /// Number of referencing slots.
        found: usize,
    },

    /// A direct link is referenced by more than two slots.
    #[error("Direct link '{link}' is point-to-point, found {found} endpoints")]
    TooManyEndpoints {
        /// The link name.
        link: String,
        /// Number of referencing slots.
        found: usize,
    },

    /// A device references no declared link or bridge.
    #[error("Device '{device}' of namespace '{namespace}' matches no link or bridge")]
    UnresolvedDevice {
        /// The namespace name.
        namespace: String,
        /// The device name.
        device: String,
    },

    /// A host primitive failed.
    #[error("Failed to {operation} '{resource}': {source}")]
    Primitive {
        /// The operation, e.g. "create namespace".
        operation: &'static str,
        /// The resource the operation targeted.
        resource: String,
        /// The underlying command error.
        #[source]
        source: ShellError,
    },

    /// A state file already exists.
    #[error("Resources have already been provisioned (state file {path})")]
    AlreadyProvisioned {
        /// The state file path.
        path: String,
    },

    /// No state file exists.
    #[error("Resources have already been cleared (no state file at {path})")]
    NoSavedState {
        /// The state file path.
        path: String,
    },

    /// The state file exists but cannot be parsed.
    #[error("Corrupt state file {path}: {source}")]
    CorruptState {
        /// The state file path.
        path: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The state could not be serialized.
    #[error("Failed to encode state: {source}")]
    StateEncode {
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing the state file failed.
    #[error("State file {path}: {source}")]
    StateIo {
        /// The state file path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a scenario file or directory failed.
    #[error("Scenario {path}: {source}")]
    ScenarioIo {
        /// The file or directory path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// Teardown finished with one or more failures.
    #[error("Teardown incomplete: {0}")]
    Teardown(TeardownReport),
}

impl TopologyError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a primitive error.
    pub fn primitive(operation: &'static str, resource: impl Into<String>, source: ShellError) -> Self {
        Self::Primitive {
            operation,
            resource: resource.into(),
            source,
        }
    }

    /// Creates a state IO error.
    pub fn state_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::StateIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TopologyError::InsufficientEndpoints {
            link: "L1".to_string(),
            found: 1,
        };
        assert_eq!(err.to_string(), "Direct link 'L1' needs 2 endpoints, found 1");
    }

    #[test]
    fn test_primitive_error_display() {
        let err = TopologyError::primitive(
            "create namespace",
            "ns1",
            ShellError::command_failed("/sbin/ip netns add ns1", 1, "File exists"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to create namespace 'ns1'"));
        assert!(msg.contains("exit code 1"));
    }

    #[test]
    fn test_state_encode_error_display() {
        let tuple_keys: std::collections::HashMap<(u8, u8), u8> = [((1, 2), 3)].into();
        let source = serde_json::to_vec(&tuple_keys).unwrap_err();

        let err = TopologyError::StateEncode { source };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to encode state: "));
        assert!(msg.contains("key must be a string"));
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::DirectLink.to_string(), "direct link");
        assert_eq!(ResourceKind::Namespace.as_str(), "namespace");
    }
}
