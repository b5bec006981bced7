//! Scenario state for service startup behavioural tests.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

use super::engine::{ScriptedEngine, ScriptedProber};

/// How the controller under test ended up.
#[derive(Debug, Clone)]
pub(crate) enum StartOutcome {
    /// The service came up; records declared and published container ports.
    Started {
        declared: Vec<u16>,
        published: Vec<u16>,
    },
    /// The start was aborted by a persistent failure.
    Persistent(String),
    /// Every attempt failed transiently.
    Exhausted(u32),
    /// Construction rejected two options set together.
    Conflict { first: String, second: String },
    /// A stop request completed.
    Stopped,
    /// Anything else, rendered for the failure message.
    Other(String),
}

/// HTTP readiness expectation: status code and endpoint path.
#[derive(Debug, Clone)]
pub(crate) struct HttpExpectation {
    pub(crate) status: u16,
    pub(crate) endpoint: String,
}

#[derive(Default, ScenarioState)]
pub(crate) struct StartupState {
    pub(crate) ports: Slot<Vec<u16>>,
    pub(crate) start_pattern: Slot<String>,
    pub(crate) transient_pattern: Slot<String>,
    pub(crate) persistent_pattern: Slot<String>,
    pub(crate) start_tries: Slot<u32>,
    pub(crate) log_lines: Slot<Vec<String>>,
    pub(crate) http: Slot<HttpExpectation>,
    pub(crate) http_statuses: Slot<Vec<u16>>,
    pub(crate) use_monitor: Slot<bool>,
    pub(crate) engine: Slot<Arc<ScriptedEngine>>,
    pub(crate) prober: Slot<Arc<ScriptedProber>>,
    pub(crate) outcome: Slot<StartOutcome>,
}

#[fixture]
pub(crate) fn startup_state() -> StartupState {
    let state = StartupState::default();
    state.log_lines.set(Vec::new());
    state.http_statuses.set(Vec::new());
    state.use_monitor.set(false);
    state
}
