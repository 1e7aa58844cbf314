//! Verification helpers for provisioned state and issued commands

use ayame::State;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {expected} {what}, found {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Direct link '{name}' not found")]
    DirectLinkNotFound { name: String },

    #[error("Bridge '{name}' not found")]
    BridgeNotFound { name: String },

    #[error("Namespace '{name}' not found")]
    NamespaceNotFound { name: String },

    #[error("Direct link '{name}': expected busy={expected}")]
    BusyMismatch { name: String, expected: bool },

    #[error("Slot '{slot}' of namespace '{namespace}': expected {expected}, got {actual:?}")]
    SlotMismatch {
        namespace: String,
        slot: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("No command containing '{pattern}' was issued")]
    CommandNotIssued { pattern: String },

    #[error("Command containing '{pattern}' was issued")]
    UnexpectedCommand { pattern: String },

    #[error("Expected '{first}' before '{second}'")]
    OrderMismatch { first: String, second: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

fn check_count(what: &'static str, expected: usize, actual: usize) -> VerifyResult<()> {
    if expected != actual {
        return Err(VerificationError::CountMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// State verification helper
pub struct StateVerifier<'a> {
    state: &'a State,
}

impl<'a> StateVerifier<'a> {
    /// Create a new state verifier
    pub fn new(state: &'a State) -> Self {
        Self { state }
    }

    /// Verify the number of direct links, bridges and namespaces
    pub fn assert_counts(&self, direct_links: usize, bridges: usize, namespaces: usize) -> VerifyResult<()> {
        check_count("direct links", direct_links, self.state.direct_links.len())?;
        check_count("bridges", bridges, self.state.bridges.len())?;
        check_count("namespaces", namespaces, self.state.namespaces.len())
    }

    /// Verify a direct link's busy flag
    pub fn assert_busy(&self, name: &str, expected: bool) -> VerifyResult<()> {
        let link = self
            .state
            .direct_links
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| VerificationError::DirectLinkNotFound {
                name: name.to_string(),
            })?;
        if link.busy != expected {
            return Err(VerificationError::BusyMismatch {
                name: name.to_string(),
                expected,
            });
        }
        Ok(())
    }

    /// Verify how many pairs a bridge has
    pub fn assert_bridge_pairs(&self, name: &str, expected: usize) -> VerifyResult<()> {
        let bridge = self
            .state
            .bridges
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| VerificationError::BridgeNotFound {
                name: name.to_string(),
            })?;
        check_count("bridge pairs", expected, bridge.veth_pairs.len())
    }

    /// Verify the endpoint in the first slot named `slot`; `None` means
    /// the slot must be unconfigured
    pub fn assert_slot(&self, namespace: &str, slot: &str, expected: Option<&str>) -> VerifyResult<()> {
        let ns = self
            .state
            .namespaces
            .iter()
            .find(|n| n.name == namespace)
            .ok_or_else(|| VerificationError::NamespaceNotFound {
                name: namespace.to_string(),
            })?;
        let actual = ns
            .devices
            .iter()
            .find(|d| d.name == slot)
            .and_then(|d| d.attached_veth.clone());

        if actual.as_deref() != expected {
            return Err(VerificationError::SlotMismatch {
                namespace: namespace.to_string(),
                slot: slot.to_string(),
                expected: expected.unwrap_or("unconfigured").to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Verify the number of configured slots across all namespaces
    pub fn assert_configured_slots(&self, expected: usize) -> VerifyResult<()> {
        let actual = self
            .state
            .namespaces
            .iter()
            .map(|ns| ns.configured_slots())
            .sum();
        check_count("configured slots", expected, actual)
    }
}

/// Command sequence verification helper
pub struct CommandVerifier<'a> {
    commands: &'a [String],
}

impl<'a> CommandVerifier<'a> {
    /// Create a new command verifier
    pub fn new(commands: &'a [String]) -> Self {
        Self { commands }
    }

    fn position(&self, pattern: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.contains(pattern))
    }

    /// Verify a command containing `pattern` was issued
    pub fn assert_issued(&self, pattern: &str) -> VerifyResult<()> {
        self.position(pattern)
            .map(|_| ())
            .ok_or_else(|| VerificationError::CommandNotIssued {
                pattern: pattern.to_string(),
            })
    }

    /// Verify no command containing `pattern` was issued
    pub fn assert_not_issued(&self, pattern: &str) -> VerifyResult<()> {
        match self.position(pattern) {
            Some(_) => Err(VerificationError::UnexpectedCommand {
                pattern: pattern.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Verify the first command matching `first` precedes the first
    /// matching `second`
    pub fn assert_order(&self, first: &str, second: &str) -> VerifyResult<()> {
        let a = self.position(first).ok_or_else(|| VerificationError::CommandNotIssued {
            pattern: first.to_string(),
        })?;
        let b = self.position(second).ok_or_else(|| VerificationError::CommandNotIssued {
            pattern: second.to_string(),
        })?;
        if a >= b {
            return Err(VerificationError::OrderMismatch {
                first: first.to_string(),
                second: second.to_string(),
            });
        }
        Ok(())
    }

    /// Verify how many commands contain `pattern`
    pub fn assert_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self.commands.iter().filter(|c| c.contains(pattern)).count();
        check_count("matching commands", expected, actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_verifier() {
        let commands = vec![
            "/sbin/ip netns add ns1".to_string(),
            "/sbin/ip netns add ns2".to_string(),
        ];
        let v = CommandVerifier::new(&commands);

        assert!(v.assert_issued("add ns1").is_ok());
        assert!(v.assert_not_issued("delete").is_ok());
        assert!(v.assert_order("add ns1", "add ns2").is_ok());
        assert!(matches!(
            v.assert_order("add ns2", "add ns1"),
            Err(VerificationError::OrderMismatch { .. })
        ));
        assert!(v.assert_count("netns add", 2).is_ok());
    }

    #[test]
    fn test_state_verifier_on_empty_state() {
        let state = State::default();
        let v = StateVerifier::new(&state);

        assert!(v.assert_counts(0, 0, 0).is_ok());
        let err = v.assert_busy("L1", true).unwrap_err();
        assert_eq!(err.to_string(), "Direct link 'L1' not found");
    }
}
