//! Readiness detectors.
//!
//! Detectors are predicates that turn a readiness signal into a verdict. Log
//! detectors see one line of container output together with the service it
//! came from; HTTP detectors see the response to a readiness probe.

mod http;

use std::fmt;
use std::sync::Arc;

use crate::service::DockerisedService;

pub use self::http::{HttpDetector, HttpProber, ProbeError, ProbeFuture, ProbeResponse};

type LinePredicate = dyn Fn(&str, &DockerisedService) -> bool + Send + Sync;

/// Predicate over one line of container output.
///
/// Every detector receives the line and the service being started. Detectors
/// that only care about the line are built with [`LogDetector::line`] or
/// [`LogDetector::contains`] and ignore the service.
#[derive(Clone)]
pub struct LogDetector(Arc<LinePredicate>);

impl LogDetector {
    /// Wrap a predicate over the line and the service.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str, &DockerisedService) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Wrap a predicate that only inspects the line.
    pub fn line<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(move |line, _service| predicate(line))
    }

    /// Match lines containing `needle`.
    pub fn contains(needle: impl Into<String>) -> Self {
        let pattern = needle.into();
        Self::line(move |line| line.contains(pattern.as_str()))
    }

    /// Apply the predicate.
    #[must_use]
    pub fn matches(&self, line: &str, service: &DockerisedService) -> bool {
        (self.0)(line, service)
    }
}

impl fmt::Debug for LogDetector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("LogDetector(..)")
    }
}

/// What a log line says about the starting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogClassification {
    /// The service reported that it is ready.
    Started,
    /// The service hit a failure that may clear on another attempt.
    TransientError,
    /// The service hit a failure that will recur.
    PersistentError,
    /// No detector matched.
    Unmatched,
}

/// The three log detector roles of one controller.
#[derive(Debug, Clone, Default)]
pub struct LogDetectors {
    /// Matches the line announcing the service is ready.
    pub start: Option<LogDetector>,
    /// Matches lines signalling a retryable failure.
    pub transient_error: Option<LogDetector>,
    /// Matches lines signalling a failure no retry can fix.
    pub persistent_error: Option<LogDetector>,
}

impl LogDetectors {
    /// Whether any role has a detector.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.start.is_some() || self.transient_error.is_some() || self.persistent_error.is_some()
    }

    /// Classify `line`, checking persistent errors, then transient errors,
    /// then the start detector. Only the first match counts.
    #[must_use]
    pub fn classify(&self, line: &str, service: &DockerisedService) -> LogClassification {
        let hits = |detector: Option<&LogDetector>| {
            detector.is_some_and(|candidate| candidate.matches(line, service))
        };

        if hits(self.persistent_error.as_ref()) {
            LogClassification::PersistentError
        } else if hits(self.transient_error.as_ref()) {
            LogClassification::TransientError
        } else if hits(self.start.as_ref()) {
            LogClassification::Started
        } else {
            LogClassification::Unmatched
        }
    }
}
