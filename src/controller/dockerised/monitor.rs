//! Readiness monitoring by log stream and HTTP polling.

use std::time::Duration;

use futures_util::StreamExt;

use crate::detector::{HttpDetector, HttpProber, LogClassification, LogDetectors};
use crate::engine::ContainerRuntime;
use crate::error::{ConfigError, ContainerError, FixtainerError, ServiceStartError};
use crate::service::{DockerisedService, Service};

/// Pause between HTTP readiness probes.
pub(super) const HTTP_POLL_INTERVAL_MS: u64 = 100;

/// Follow the container's output until a detector decides the outcome.
///
/// Persistent errors win over transient errors, which win over the start
/// detector. If the output ends without any match the container has exited,
/// which counts as a transient failure carrying the full log dump.
pub(super) async fn watch_logs(
    runtime: &dyn ContainerRuntime,
    detectors: &LogDetectors,
    service: &DockerisedService,
) -> Result<(), FixtainerError> {
    let container_id = service
        .container()
        .map(|container| container.id.as_str())
        .ok_or_else(|| {
            FixtainerError::from(ContainerError::LogsFailed {
                container_id: String::from(service.name()),
                message: String::from("service has no container"),
            })
        })?;

    let mut output = runtime.log_stream(container_id);
    let mut lines = LineBuffer::default();
    while let Some(chunk) = output.next().await {
        let bytes = match chunk {
            Ok(frame) => frame.into_bytes(),
            Err(error) => return Err(broken_stream(service, &error, &lines.transcript)),
        };
        for line in lines.push(&bytes) {
            if let Some(verdict) = inspect_line(detectors, &line, service) {
                return verdict;
            }
        }
    }
    if let Some(line) = lines.finish()
        && let Some(verdict) = inspect_line(detectors, &line, service)
    {
        return verdict;
    }

    let dump = match runtime.logs(container_id).await {
        Ok(full_logs) => full_logs,
        Err(error) => {
            tracing::debug!(error = %error, "could not fetch log dump; using streamed output");
            lines.transcript
        }
    };
    let reason = format!("no error detected in logs but the container has stopped. Log dump: {dump}");
    tracing::warn!(service = service.name(), "container exited before becoming ready");
    Err(FixtainerError::from(ServiceStartError::transient(reason)))
}

/// A log stream that breaks off mid-start is treated like a container that
/// exited: another attempt may succeed.
fn broken_stream(
    service: &DockerisedService,
    error: &bollard::errors::Error,
    transcript: &str,
) -> FixtainerError {
    tracing::warn!(service = service.name(), error = %error, "log stream broke before the service was ready");
    FixtainerError::from(ServiceStartError::transient(format!(
        "log stream failed: {error}. Log output so far: {transcript}"
    )))
}

fn inspect_line(
    detectors: &LogDetectors,
    line: &str,
    service: &DockerisedService,
) -> Option<Result<(), FixtainerError>> {
    tracing::debug!(service = service.name(), line, "container output");
    match detectors.classify(line, service) {
        LogClassification::PersistentError => {
            tracing::error!(service = service.name(), line, "persistent start failure detected");
            Some(Err(ServiceStartError::persistent(line).into()))
        }
        LogClassification::TransientError => {
            tracing::warn!(service = service.name(), line, "transient start failure detected");
            Some(Err(ServiceStartError::transient(line).into()))
        }
        LogClassification::Started => Some(Ok(())),
        LogClassification::Unmatched => None,
    }
}

/// Probe `endpoint` on the host port of `container_port` until `detector`
/// accepts a response.
///
/// Probe failures (connection refused while the service boots) count as not
/// ready. There is no attempt limit; the controller's start timeout bounds
/// the wait.
pub(super) async fn poll_http(
    prober: &dyn HttpProber,
    detector: &HttpDetector,
    endpoint: &str,
    service: &DockerisedService,
    container_port: u16,
) -> Result<(), FixtainerError> {
    let host_port = service.host_port(container_port).ok_or_else(|| {
        FixtainerError::from(ConfigError::InvalidValue {
            field: String::from("ports"),
            reason: format!("port {container_port} has no host port allocated"),
        })
    })?;
    let url = probe_url(service.host(), host_port, endpoint);
    let interval = Duration::from_millis(HTTP_POLL_INTERVAL_MS);

    let mut polls: u32 = 0;
    loop {
        polls = polls.saturating_add(1);
        match prober.head(&url).await {
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status, polls, "readiness probe answered");
                if detector.is_ready(&response) {
                    return Ok(());
                }
            }
            Err(error) => {
                tracing::debug!(url = %url, error = %error, polls, "readiness probe failed");
            }
        }
        tokio::time::sleep(interval).await;
    }
}

fn probe_url(host: &str, port: u16, endpoint: &str) -> String {
    format!("http://{host}:{port}/{}", endpoint.trim_start_matches('/'))
}

/// Splits streamed output chunks into lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
    transcript: String,
}

impl LineBuffer {
    /// Append a chunk, returning every line it completes.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.transcript.push_str(&String::from_utf8_lossy(chunk));
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(decode_line(&raw));
        }
        lines
    }

    /// The trailing unterminated line, if any.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from(String::from_utf8_lossy(raw).trim_end_matches(['\n', '\r']))
}
