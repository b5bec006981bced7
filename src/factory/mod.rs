//! Reusable controller templates and declarative service definitions.
//!
//! A [`ControllerTemplate`] fixes the image, published ports, log detectors
//! and service model of a family of controllers, so a project can describe a
//! service once and build controllers for it wherever a fixture is needed.
//! [`ServiceDefinition`] and [`ServiceCatalog`] express the same thing as
//! TOML for the `fixtainer` binary.
//!
//! ```toml
//! [services.couchdb]
//! repository = "couchdb"
//! tag = "3.3"
//! ports = [5984]
//! start_http_endpoint = "_up"
//!
//! [services.rabbitmq]
//! repository = "rabbitmq"
//! ports = [5672]
//! start_log_pattern = "Server startup complete"
//! ```

mod catalog;
mod definition;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use smart_default::SmartDefault;

use crate::controller::dockerised::{DockerisedController, DockerisedControllerBuilder};
use crate::detector::LogDetectors;
use crate::engine::ContainerRuntime;
use crate::error::FixtainerError;
use crate::service::{DockerisedModel, DockerisedService};

pub use self::catalog::ServiceCatalog;
pub use self::definition::{DEFAULT_HTTP_STATUS, DEFAULT_TAG, ServiceDefinition};

/// Start options applied to every controller a caller builds.
///
/// Values set on an individual [`ServiceDefinition`] take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault)]
pub struct ControllerDefaults {
    /// Deadline for each readiness wait.
    pub start_timeout: Option<Duration>,
    /// Maximum number of start attempts.
    pub start_tries: Option<u32>,
    /// Pull the image on every start.
    #[default = true]
    pub pull: bool,
}

impl ControllerDefaults {
    /// Apply the defaults to `builder`.
    #[must_use]
    pub fn apply<S: DockerisedModel>(
        &self,
        builder: DockerisedControllerBuilder<S>,
    ) -> DockerisedControllerBuilder<S> {
        let mut configured = builder.pull(self.pull);
        if let Some(timeout) = self.start_timeout {
            configured = configured.start_timeout(timeout);
        }
        if let Some(tries) = self.start_tries {
            configured = configured.start_tries(tries);
        }
        configured
    }
}

/// Fixed image, ports and detectors for controllers populating models of
/// type `S`.
pub struct ControllerTemplate<S = DockerisedService> {
    repository: String,
    tag: String,
    ports: Vec<u16>,
    detectors: LogDetectors,
    model: PhantomData<fn() -> S>,
}

impl<S> Clone for ControllerTemplate<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            tag: self.tag.clone(),
            ports: self.ports.clone(),
            detectors: self.detectors.clone(),
            model: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for ControllerTemplate<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ControllerTemplate")
            .field("repository", &self.repository)
            .field("tag", &self.tag)
            .field("ports", &self.ports)
            .field("detectors", &self.detectors)
            .finish()
    }
}

impl<S: DockerisedModel> ControllerTemplate<S> {
    /// Template for `repository:tag` with no ports or detectors.
    #[must_use]
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            ports: Vec::new(),
            detectors: LogDetectors::default(),
            model: PhantomData,
        }
    }

    /// Container ports to publish.
    #[must_use]
    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    /// Log detectors used for readiness.
    #[must_use]
    pub fn detectors(mut self, detectors: LogDetectors) -> Self {
        self.detectors = detectors;
        self
    }

    /// The same template for another tag of the image.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..self.clone()
        }
    }

    /// `repository:tag`.
    #[must_use]
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// A builder preloaded with the template, for further options.
    #[must_use]
    pub fn builder(&self) -> DockerisedControllerBuilder<S> {
        DockerisedControllerBuilder::new(self.repository.as_str(), self.tag.as_str())
            .ports(self.ports.iter().copied())
            .log_detectors(self.detectors.clone())
    }

    /// Build a controller straight from the template.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of [`DockerisedControllerBuilder::build`].
    pub fn build(
        &self,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<DockerisedController<S>, FixtainerError> {
        self.builder().build(runtime)
    }
}
