//! Assertion helpers for service startup behavioural tests.

use std::sync::Arc;

use rstest_bdd_macros::then;

use super::StepResult;
use super::engine::ScriptedEngine;
use super::state::{StartOutcome, StartupState};

fn outcome(startup_state: &StartupState) -> StepResult<StartOutcome> {
    startup_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

fn engine(startup_state: &StartupState) -> StepResult<Arc<ScriptedEngine>> {
    startup_state
        .engine
        .get()
        .ok_or_else(|| String::from("engine should be installed"))
}

#[then("the service is ready")]
fn service_is_ready(startup_state: &StartupState) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Started { .. } => Ok(()),
        StartOutcome::Other(message) => Err(format!("expected a started service, got: {message}")),
        other => Err(format!("expected a started service, got {other:?}")),
    }
}

#[then("every declared port is published")]
fn every_port_published(startup_state: &StartupState) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Started {
            declared,
            published,
        } if declared == published => Ok(()),
        StartOutcome::Started {
            declared,
            published,
        } => Err(format!(
            "declared ports {declared:?} but published {published:?}"
        )),
        other => Err(format!("expected a started service, got {other:?}")),
    }
}

#[then("the engine created {count} containers")]
fn engine_created(startup_state: &StartupState, count: u32) -> StepResult<()> {
    let created = engine(startup_state)?.created();
    if created == count {
        Ok(())
    } else {
        Err(format!("expected {count} containers created, got {created}"))
    }
}

#[then("the engine removed {count} containers")]
fn engine_removed(startup_state: &StartupState, count: u32) -> StepResult<()> {
    let removed = engine(startup_state)?.removed();
    if removed == count {
        Ok(())
    } else {
        Err(format!("expected {count} containers removed, got {removed}"))
    }
}

#[then("the start fails persistently mentioning \"{text}\"")]
fn start_fails_persistently(startup_state: &StartupState, text: String) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Persistent(reason) if reason.contains(&text) => Ok(()),
        StartOutcome::Persistent(reason) => {
            Err(format!("persistent failure '{reason}' does not mention '{text}'"))
        }
        other => Err(format!("expected a persistent failure, got {other:?}")),
    }
}

#[then("the start fails after exhausting {attempts} attempts")]
fn start_exhausts_retries(startup_state: &StartupState, attempts: u32) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Exhausted(made) if made == attempts => Ok(()),
        StartOutcome::Exhausted(made) => {
            Err(format!("expected {attempts} attempts, got {made}"))
        }
        other => Err(format!("expected exhausted retries, got {other:?}")),
    }
}

#[then("the endpoint was polled {count} times")]
fn endpoint_polled(startup_state: &StartupState, count: usize) -> StepResult<()> {
    let prober = startup_state
        .prober
        .get()
        .ok_or_else(|| String::from("prober should be installed"))?;
    let polls = prober.polls();
    if polls.len() != count {
        return Err(format!("expected {count} polls, got {polls:?}"));
    }
    match polls.iter().find(|url| !url.ends_with("/_up")) {
        Some(url) => Err(format!("unexpected probe URL {url}")),
        None => Ok(()),
    }
}

#[then("construction fails with conflicting options")]
fn construction_conflicts(startup_state: &StartupState) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Conflict { first, second } if !first.is_empty() && !second.is_empty() => {
            Ok(())
        }
        other => Err(format!("expected conflicting options, got {other:?}")),
    }
}

#[then("the stop succeeds")]
fn stop_succeeds(startup_state: &StartupState) -> StepResult<()> {
    match outcome(startup_state)? {
        StartOutcome::Stopped => Ok(()),
        StartOutcome::Other(message) => Err(format!("expected a successful stop, got: {message}")),
        other => Err(format!("expected a successful stop, got {other:?}")),
    }
}
