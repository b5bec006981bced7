//! Serde model of one service in a catalog file.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ControllerDefaults, ControllerTemplate};
use crate::controller::dockerised::{DockerisedController, DockerisedControllerBuilder};
use crate::detector::{HttpDetector, LogDetector, LogDetectors};
use crate::engine::ContainerRuntime;
use crate::error::{ConfigError, FixtainerError};
use crate::service::DockerisedModel;

/// Tag used when a definition names none.
pub const DEFAULT_TAG: &str = "latest";

/// Status expected from the HTTP readiness endpoint when none is given.
pub const DEFAULT_HTTP_STATUS: u16 = 200;

fn default_tag() -> String {
    String::from(DEFAULT_TAG)
}

/// A service described as data rather than code.
///
/// Log patterns become substring detectors. `start_http_endpoint` switches
/// readiness to HTTP polling, expecting `start_http_status` (200 unless set).
/// The start options override the [`ControllerDefaults`] they are combined
/// with.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    /// Image repository.
    pub repository: String,

    /// Image tag.
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Container ports to publish.
    #[serde(default)]
    pub ports: Vec<u16>,

    /// Substring marking the line that announces readiness.
    pub start_log_pattern: Option<String>,

    /// Substring marking a retryable failure.
    pub transient_error_log_pattern: Option<String>,

    /// Substring marking a failure no retry can fix.
    pub persistent_error_log_pattern: Option<String>,

    /// Path probed for HTTP readiness on the first declared port.
    pub start_http_endpoint: Option<String>,

    /// Status code that signals HTTP readiness.
    pub start_http_status: Option<u16>,

    /// Deadline in seconds for each readiness wait.
    pub start_timeout_secs: Option<u64>,

    /// Maximum number of start attempts.
    pub start_tries: Option<u32>,

    /// Pull the image on every start.
    pub pull: Option<bool>,

    /// Extra container create settings in Docker API form.
    #[serde(default)]
    pub additional_run_settings: Map<String, Value>,
}

impl ServiceDefinition {
    /// A definition of `repository` at the default tag with nothing else set.
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: default_tag(),
            ports: Vec::new(),
            start_log_pattern: None,
            transient_error_log_pattern: None,
            persistent_error_log_pattern: None,
            start_http_endpoint: None,
            start_http_status: None,
            start_timeout_secs: None,
            start_tries: None,
            pull: None,
            additional_run_settings: Map::new(),
        }
    }

    /// Substring detectors for the configured log patterns.
    #[must_use]
    pub fn detectors(&self) -> LogDetectors {
        LogDetectors {
            start: self.start_log_pattern.as_deref().map(LogDetector::contains),
            transient_error: self
                .transient_error_log_pattern
                .as_deref()
                .map(LogDetector::contains),
            persistent_error: self
                .persistent_error_log_pattern
                .as_deref()
                .map(LogDetector::contains),
        }
    }

    /// The image, ports and detectors as a template.
    #[must_use]
    pub fn template<S: DockerisedModel>(&self) -> ControllerTemplate<S> {
        ControllerTemplate::new(self.repository.as_str(), self.tag.as_str())
            .ports(self.ports.iter().copied())
            .detectors(self.detectors())
    }

    /// A builder carrying `defaults` overridden by this definition.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a status code outside
    /// 100..=999 and `ConfigError::IncompleteOption` when a status is given
    /// without an endpoint.
    pub fn builder_with<S: DockerisedModel>(
        &self,
        defaults: &ControllerDefaults,
    ) -> Result<DockerisedControllerBuilder<S>, FixtainerError> {
        let mut builder = defaults
            .apply(self.template::<S>().builder())
            .additional_run_settings(self.additional_run_settings.clone());

        if let Some(secs) = self.start_timeout_secs {
            builder = builder.start_timeout(Duration::from_secs(secs));
        }
        if let Some(tries) = self.start_tries {
            builder = builder.start_tries(tries);
        }
        if let Some(pull) = self.pull {
            builder = builder.pull(pull);
        }

        match (&self.start_http_endpoint, self.start_http_status) {
            (Some(endpoint), status) => {
                let detector = http_detector(status.unwrap_or(DEFAULT_HTTP_STATUS))?;
                builder = builder
                    .start_http_detector(detector)
                    .start_http_detection_endpoint(endpoint.as_str());
            }
            (None, Some(_)) => {
                return Err(FixtainerError::from(ConfigError::IncompleteOption {
                    present: String::from("start_http_status"),
                    missing: String::from("start_http_endpoint"),
                }));
            }
            (None, None) => {}
        }
        Ok(builder)
    }

    /// Build a controller for this definition.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::builder_with`] and of
    /// [`DockerisedControllerBuilder::build`].
    pub fn build<S: DockerisedModel>(
        &self,
        defaults: &ControllerDefaults,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<DockerisedController<S>, FixtainerError> {
        self.builder_with::<S>(defaults)?.build(runtime)
    }
}

fn http_detector(status: u16) -> Result<HttpDetector, FixtainerError> {
    let expected = StatusCode::from_u16(status).map_err(|error| ConfigError::InvalidValue {
        field: String::from("start_http_status"),
        reason: error.to_string(),
    })?;
    Ok(HttpDetector::status(expected))
}
