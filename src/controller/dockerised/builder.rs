//! Construction and validation of dockerised controllers.

use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use super::{DockerisedController, DockerisedLifecycle, DockerisedOptions, Readiness, StartupMonitor};
use crate::controller::{ServiceController, StartPolicy};
use crate::detector::{HttpDetector, HttpProber, LogDetector, LogDetectors};
use crate::engine::ContainerRuntime;
use crate::error::{ConfigError, ContainerError, FixtainerError};
use crate::service::{DockerisedModel, DockerisedService};

/// Collects the options of a dockerised controller.
///
/// Nothing is validated until [`Self::build`], which rejects conflicting or
/// incomplete combinations before any container is created.
///
/// Defaults: the image is pulled on every start, readiness waits have no
/// deadline and attempts are unbounded.
pub struct DockerisedControllerBuilder<S = DockerisedService> {
    repository: String,
    tag: String,
    ports: Vec<u16>,
    start_timeout: Option<Duration>,
    start_tries: Option<u32>,
    pull: bool,
    additional_run_settings: Map<String, Value>,
    detectors: LogDetectors,
    start_http_detector: Option<HttpDetector>,
    start_http_detection_endpoint: Option<String>,
    startup_monitor: Option<StartupMonitor>,
    http_prober: Option<Arc<dyn HttpProber>>,
    model: PhantomData<fn() -> S>,
}

impl<S> Clone for DockerisedControllerBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            tag: self.tag.clone(),
            ports: self.ports.clone(),
            start_timeout: self.start_timeout,
            start_tries: self.start_tries,
            pull: self.pull,
            additional_run_settings: self.additional_run_settings.clone(),
            detectors: self.detectors.clone(),
            start_http_detector: self.start_http_detector.clone(),
            start_http_detection_endpoint: self.start_http_detection_endpoint.clone(),
            startup_monitor: self.startup_monitor.clone(),
            http_prober: self.http_prober.clone(),
            model: PhantomData,
        }
    }
}

impl<S: DockerisedModel> DockerisedControllerBuilder<S> {
    /// Start describing a controller for `repository:tag`.
    #[must_use]
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            ports: Vec::new(),
            start_timeout: None,
            start_tries: None,
            pull: true,
            additional_run_settings: Map::new(),
            detectors: LogDetectors::default(),
            start_http_detector: None,
            start_http_detection_endpoint: None,
            startup_monitor: None,
            http_prober: None,
            model: PhantomData,
        }
    }

    /// Container ports to publish on allocated host ports.
    #[must_use]
    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    /// Deadline for each readiness wait.
    #[must_use]
    pub const fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Maximum number of start attempts (at least 1).
    #[must_use]
    pub const fn start_tries(mut self, tries: u32) -> Self {
        self.start_tries = Some(tries);
        self
    }

    /// Whether to pull the image on every start. When disabled the image is
    /// only pulled if it is not present locally.
    #[must_use]
    pub const fn pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    /// Extra container create settings in Docker API form.
    #[must_use]
    pub fn additional_run_settings(mut self, settings: Map<String, Value>) -> Self {
        self.additional_run_settings = settings;
        self
    }

    /// Detector for the line announcing the service is ready.
    #[must_use]
    pub fn start_log_detector(mut self, detector: LogDetector) -> Self {
        self.detectors.start = Some(detector);
        self
    }

    /// Detector for lines signalling a retryable failure.
    #[must_use]
    pub fn transient_error_log_detector(mut self, detector: LogDetector) -> Self {
        self.detectors.transient_error = Some(detector);
        self
    }

    /// Detector for lines signalling a failure no retry can fix.
    #[must_use]
    pub fn persistent_error_log_detector(mut self, detector: LogDetector) -> Self {
        self.detectors.persistent_error = Some(detector);
        self
    }

    /// Replace all three log detector roles at once.
    #[must_use]
    pub fn log_detectors(mut self, detectors: LogDetectors) -> Self {
        self.detectors = detectors;
        self
    }

    /// Classifier for HTTP readiness probes. Requires
    /// [`Self::start_http_detection_endpoint`].
    #[must_use]
    pub fn start_http_detector(mut self, detector: HttpDetector) -> Self {
        self.start_http_detector = Some(detector);
        self
    }

    /// Path probed on the first declared port. Requires
    /// [`Self::start_http_detector`].
    #[must_use]
    pub fn start_http_detection_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.start_http_detection_endpoint = Some(endpoint.into());
        self
    }

    /// Custom readiness check replacing every detector.
    #[must_use]
    pub fn startup_monitor(mut self, monitor: StartupMonitor) -> Self {
        self.startup_monitor = Some(monitor);
        self
    }

    /// HTTP client used for readiness probes (defaults to `reqwest`).
    #[must_use]
    pub fn http_prober(mut self, prober: Arc<dyn HttpProber>) -> Self {
        self.http_prober = Some(prober);
        self
    }

    /// Validate the options and build a controller that talks to `runtime`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConflictingOptions` when the startup monitor is
    /// combined with a detector or log detectors with HTTP detection,
    /// `ConfigError::IncompleteOption` when only one of the HTTP detector and
    /// endpoint is set,
    /// `ConfigError::MissingRequired` for an empty repository or tag,
    /// `ConfigError::InvalidValue` for zero start tries or HTTP detection
    /// without a declared port, and `ContainerError::HttpClientFailed` if
    /// the default HTTP client cannot be built.
    pub fn build(
        self,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<DockerisedController<S>, FixtainerError> {
        let policy = self.start_policy()?;
        let readiness = self.readiness()?;
        require_non_empty("repository", &self.repository)?;
        require_non_empty("tag", &self.tag)?;

        let prober = match (&readiness, self.http_prober) {
            (Readiness::HttpPoll { .. }, None) => Some(default_prober()?),
            (_, supplied) => supplied,
        };

        let options = DockerisedOptions {
            repository: self.repository,
            tag: self.tag,
            ports: self.ports,
            pull: self.pull,
            additional_run_settings: self.additional_run_settings,
            readiness,
        };
        let lifecycle = DockerisedLifecycle {
            options,
            runtime,
            prober,
            model: PhantomData,
        };
        Ok(ServiceController::new(lifecycle, policy))
    }

    fn start_policy(&self) -> Result<StartPolicy, FixtainerError> {
        let start_tries = match self.start_tries {
            None => None,
            Some(tries) => Some(NonZeroU32::new(tries).ok_or_else(|| {
                FixtainerError::from(ConfigError::InvalidValue {
                    field: String::from("start_tries"),
                    reason: String::from("must be at least 1"),
                })
            })?),
        };
        Ok(StartPolicy {
            start_timeout: self.start_timeout,
            start_tries,
        })
    }

    fn readiness(&self) -> Result<Readiness, FixtainerError> {
        let uses_log = self.detectors.is_configured();
        let uses_http = self.start_http_detector.is_some();

        if let Some(monitor) = &self.startup_monitor {
            if let Some(detector) = self.first_detector_name() {
                return Err(conflict("startup_monitor", detector));
            }
            return Ok(Readiness::Custom(monitor.clone()));
        }
        if uses_log && uses_http {
            return Err(conflict("start_log_detector", "start_http_detector"));
        }

        match (&self.start_http_detector, &self.start_http_detection_endpoint) {
            (Some(_), None) => {
                return Err(incomplete("start_http_detector", "start_http_detection_endpoint"));
            }
            (None, Some(_)) => {
                return Err(incomplete("start_http_detection_endpoint", "start_http_detector"));
            }
            (Some(detector), Some(endpoint)) => {
                if self.ports.is_empty() {
                    return Err(FixtainerError::from(ConfigError::InvalidValue {
                        field: String::from("ports"),
                        reason: String::from("HTTP detection needs at least one declared port"),
                    }));
                }
                return Ok(Readiness::HttpPoll {
                    detector: detector.clone(),
                    endpoint: endpoint.clone(),
                });
            }
            (None, None) => {}
        }

        // Without a start detector only an error line or the end of the
        // output ends the wait.
        if uses_log {
            Ok(Readiness::LogStream(self.detectors.clone()))
        } else {
            Ok(Readiness::Immediate)
        }
    }

    fn first_detector_name(&self) -> Option<&'static str> {
        [
            ("start_log_detector", self.detectors.start.is_some()),
            (
                "persistent_error_log_detector",
                self.detectors.persistent_error.is_some(),
            ),
            (
                "transient_error_log_detector",
                self.detectors.transient_error.is_some(),
            ),
            ("start_http_detector", self.start_http_detector.is_some()),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), FixtainerError> {
    if value.trim().is_empty() {
        return Err(FixtainerError::from(ConfigError::MissingRequired {
            field: String::from(field),
        }));
    }
    Ok(())
}

fn conflict(first: &str, second: &str) -> FixtainerError {
    FixtainerError::from(ConfigError::ConflictingOptions {
        first: String::from(first),
        second: String::from(second),
    })
}

fn incomplete(present: &str, missing: &str) -> FixtainerError {
    FixtainerError::from(ConfigError::IncompleteOption {
        present: String::from(present),
        missing: String::from(missing),
    })
}

fn default_prober() -> Result<Arc<dyn HttpProber>, FixtainerError> {
    let client = reqwest::Client::builder().build().map_err(|error| {
        FixtainerError::from(ContainerError::HttpClientFailed {
            message: error.to_string(),
        })
    })?;
    Ok(Arc::new(client))
}
