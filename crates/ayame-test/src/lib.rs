//! Integration test infrastructure for ayame
//!
//! Provides:
//! - Topology fixtures for common lab shapes
//! - A recording lab environment with a throwaway state file
//! - State and command-sequence verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
