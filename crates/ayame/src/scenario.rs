//! Scenario harness.
//!
//! A scenario file pairs a topology with the state dump provisioning it
//! should produce:
//!
//! ```yaml
//! topology:
//!   links:
//!     - name: L1
//!       mode: direct_link
//!   namespaces:
//!     - name: ns1
//!       devices:
//!         - name: L1
//!           cidr: 10.0.0.1/24
//! expected:
//!   direct_links: [...]
//!   bridges: []
//!   namespaces: [...]
//! ```
//!
//! Scenarios run against a [`RecordingRunner`], so nothing touches the
//! host and no state file is read or written. A file whose stem ends in
//! `_fail` or `_failure` is expected to fail provisioning.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ayame_common::RecordingRunner;

use crate::binding::BindingPolicy;
use crate::config::TopologyConfig;
use crate::error::{TopologyError, TopologyResult};
use crate::net::HostNetwork;
use crate::orchestrator::provision;

/// Whether a scenario should provision successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Success,
    Failure,
}

impl Expectation {
    /// Derives the expectation from a scenario name.
    pub fn from_name(name: &str) -> Self {
        if name.ends_with("_fail") || name.ends_with("_failure") {
            Expectation::Failure
        } else {
            Expectation::Success
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    topology: TopologyConfig,
    #[serde(default)]
    expected: Option<Value>,
}

/// A topology with its expected outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub topology: TopologyConfig,
    /// Reference state dump. Without one, only the outcome is checked.
    pub expected: Option<Value>,
}

impl Scenario {
    /// Parses a scenario document.
    pub fn from_yaml(name: impl Into<String>, input: &str) -> TopologyResult<Self> {
        let name = name.into();
        let file: ScenarioFile = serde_yaml::from_str(input).map_err(|e| {
            TopologyError::invalid_config("scenario", format!("failed to parse {}: {}", name, e))
        })?;
        Ok(Self {
            name,
            topology: file.topology,
            expected: file.expected,
        })
    }

    /// Reads a scenario file; the name is the file stem.
    pub async fn load(path: &Path) -> TopologyResult<Self> {
        let input = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TopologyError::ScenarioIo {
                path: path.display().to_string(),
                source: e,
            })?;
        Self::from_yaml(scenario_name(path), &input)
    }

    pub fn expectation(&self) -> Expectation {
        Expectation::from_name(&self.name)
    }
}

fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A single mismatch between two JSON trees.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    /// Location, e.g. `$.namespaces[0].name`.
    pub path: String,
    /// Value in the reference, `None` if missing there.
    pub expected: Option<Value>,
    /// Value produced, `None` if missing there.
    pub actual: Option<Value>,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| match v {
            Some(v) => v.to_string(),
            None => "<missing>".to_string(),
        };
        write!(
            f,
            "{}: expected {}, got {}",
            self.path,
            show(&self.expected),
            show(&self.actual)
        )
    }
}

/// Compares two JSON trees. Object keys are matched by name, array
/// elements by position.
pub fn structural_diff(expected: &Value, actual: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_at("$".to_string(), expected, actual, &mut out);
    out
}

fn diff_at(path: String, expected: &Value, actual: &Value, out: &mut Vec<Difference>) {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            for (key, ev) in e {
                let child = format!("{}.{}", path, key);
                match a.get(key) {
                    Some(av) => diff_at(child, ev, av, out),
                    None => out.push(Difference {
                        path: child,
                        expected: Some(ev.clone()),
                        actual: None,
                    }),
                }
            }
            for (key, av) in a {
                if !e.contains_key(key) {
                    out.push(Difference {
                        path: format!("{}.{}", path, key),
                        expected: None,
                        actual: Some(av.clone()),
                    });
                }
            }
        }
        (Value::Array(e), Value::Array(a)) => {
            for i in 0..e.len().max(a.len()) {
                let child = format!("{}[{}]", path, i);
                match (e.get(i), a.get(i)) {
                    (Some(ev), Some(av)) => diff_at(child, ev, av, out),
                    (ev, av) => out.push(Difference {
                        path: child,
                        expected: ev.cloned(),
                        actual: av.cloned(),
                    }),
                }
            }
        }
        (e, a) if e == a => {}
        (e, a) => out.push(Difference {
            path,
            expected: Some(e.clone()),
            actual: Some(a.clone()),
        }),
    }
}

/// Result of running one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub expectation: Expectation,
    pub passed: bool,
    /// Differences against the reference dump.
    pub diff: Vec<Difference>,
    /// Error returned by validation or provisioning, if any.
    pub error: Option<String>,
    /// Commands issued, in order.
    pub commands: Vec<String>,
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}", verdict, self.name)?;
        match (&self.error, self.expectation) {
            (Some(e), Expectation::Success) => write!(f, ": unexpected error: {}", e)?,
            (None, Expectation::Failure) => write!(f, ": expected failure, provisioning succeeded")?,
            _ => {}
        }
        for d in &self.diff {
            write!(f, "\n    {}", d)?;
        }
        Ok(())
    }
}

/// Provisions the scenario's topology against a recording runner and
/// checks the result.
pub async fn run_scenario(scenario: &Scenario, policy: BindingPolicy) -> ScenarioOutcome {
    let runner = Arc::new(RecordingRunner::new());
    let net = HostNetwork::new(runner.clone());

    let result = match scenario.topology.validate() {
        Ok(()) => provision(&net, &scenario.topology, policy).await,
        Err(e) => Err(e),
    };

    let expectation = scenario.expectation();
    let mut diff = Vec::new();
    let (passed, error) = match result {
        Ok(state) => {
            if let Some(expected) = &scenario.expected {
                match state.to_value() {
                    Ok(actual) => diff = structural_diff(expected, &actual),
                    Err(e) => return failed_outcome(scenario, e.to_string(), runner.commands()),
                }
            } else {
                warn!(scenario = %scenario.name, "no expected state, checking outcome only");
            }
            (expectation == Expectation::Success && diff.is_empty(), None)
        }
        Err(e) => (expectation == Expectation::Failure, Some(e.to_string())),
    };

    ScenarioOutcome {
        name: scenario.name.clone(),
        expectation,
        passed,
        diff,
        error,
        commands: runner.commands(),
    }
}

fn failed_outcome(scenario: &Scenario, error: String, commands: Vec<String>) -> ScenarioOutcome {
    ScenarioOutcome {
        name: scenario.name.clone(),
        expectation: scenario.expectation(),
        passed: false,
        diff: Vec::new(),
        error: Some(error),
        commands,
    }
}

/// Finds every `*.yaml`/`*.yml` file under `dir`, in sorted order.
pub async fn discover(dir: &Path) -> TopologyResult<Vec<PathBuf>> {
    let io_err = |path: &Path, e| TopologyError::ScenarioIo {
        path: path.display().to_string(),
        source: e,
    };

    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| io_err(&current, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&current, e))?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| io_err(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            ) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Outcomes of a scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioSummary {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl ScenarioSummary {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for ScenarioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}

/// Runs every scenario under `dir`. A file that cannot be read or parsed
/// counts as a failed scenario.
pub async fn run_all(dir: &Path, policy: BindingPolicy) -> TopologyResult<ScenarioSummary> {
    let mut summary = ScenarioSummary::default();

    for path in discover(dir).await? {
        let outcome = match Scenario::load(&path).await {
            Ok(scenario) => run_scenario(&scenario, policy).await,
            Err(e) => ScenarioOutcome {
                name: scenario_name(&path),
                expectation: Expectation::from_name(&scenario_name(&path)),
                passed: false,
                diff: Vec::new(),
                error: Some(e.to_string()),
                commands: Vec::new(),
            },
        };
        info!(scenario = %outcome.name, passed = outcome.passed, "scenario finished");
        summary.outcomes.push(outcome);
    }

    Ok(summary)
}
