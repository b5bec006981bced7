//! Services running in Docker- or Podman-managed containers.
//!
//! A start pulls (or looks up) the image, allocates a free host port for each
//! declared container port, creates and starts a uniquely named container,
//! and then waits for readiness using the configured [`Readiness`] strategy.
//! A stop stops and force-removes the container, treating a container that
//! is already gone as stopped.

mod builder;
mod monitor;

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bollard::errors::Error as BollardError;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{LifecycleFuture, ServiceController, ServiceLifecycle};
use crate::detector::{HttpDetector, HttpProber, LogDetectors};
use crate::engine::{ContainerRuntime, ContainerSpec, is_not_found, stop_and_remove};
use crate::error::{ContainerError, FixtainerError, ServiceStartError};
use crate::service::{ContainerHandle, DockerisedModel, DockerisedService, Service, allocate_port};

pub use self::builder::DockerisedControllerBuilder;

/// Controller for dockerised services populating models of type `S`.
pub type DockerisedController<S = DockerisedService> = ServiceController<DockerisedLifecycle<S>>;

/// Boxed future returned by a [`StartupMonitor`].
pub type MonitorFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ServiceStartError>> + Send + 'a>>;

type MonitorFn = dyn for<'a> Fn(&'a DockerisedService) -> MonitorFuture<'a> + Send + Sync;

/// Caller-supplied readiness check that replaces detector-based monitoring.
///
/// The returned future resolves once the service is ready, or fails with a
/// transient or persistent [`ServiceStartError`].
#[derive(Clone)]
pub struct StartupMonitor(Arc<MonitorFn>);

impl StartupMonitor {
    /// Wrap a monitor function.
    pub fn new<F>(monitor: F) -> Self
    where
        F: for<'a> Fn(&'a DockerisedService) -> MonitorFuture<'a> + Send + Sync + 'static,
    {
        Self(Arc::new(monitor))
    }

    fn watch<'a>(&self, service: &'a DockerisedService) -> MonitorFuture<'a> {
        (self.0)(service)
    }
}

impl std::fmt::Debug for StartupMonitor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("StartupMonitor(..)")
    }
}

/// How a dockerised controller decides that a started service is ready.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// Ready as soon as the container has started.
    Immediate,
    /// Ready once the start detector matches a line of container output.
    LogStream(LogDetectors),
    /// Ready once a probe of `endpoint` satisfies `detector`.
    HttpPoll {
        /// Response classifier.
        detector: HttpDetector,
        /// Path probed on the first declared port.
        endpoint: String,
    },
    /// Ready once the custom monitor resolves.
    Custom(StartupMonitor),
}

/// Validated, immutable configuration of a dockerised controller.
#[derive(Debug, Clone)]
pub struct DockerisedOptions {
    repository: String,
    tag: String,
    ports: Vec<u16>,
    pull: bool,
    additional_run_settings: Map<String, Value>,
    readiness: Readiness,
}

impl DockerisedOptions {
    /// Image repository.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Image tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `repository:tag`.
    #[must_use]
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Container ports published for every service.
    #[must_use]
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Whether the image is pulled on every start.
    #[must_use]
    pub const fn pull(&self) -> bool {
        self.pull
    }

    /// Extra container create settings.
    #[must_use]
    pub const fn additional_run_settings(&self) -> &Map<String, Value> {
        &self.additional_run_settings
    }

    /// Readiness strategy.
    #[must_use]
    pub const fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Prefix of generated container names: the last repository segment.
    fn name_prefix(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(self.repository.as_str())
    }
}

/// [`ServiceLifecycle`] backed by a [`ContainerRuntime`].
pub struct DockerisedLifecycle<S = DockerisedService> {
    options: DockerisedOptions,
    runtime: Arc<dyn ContainerRuntime>,
    prober: Option<Arc<dyn HttpProber>>,
    model: PhantomData<fn() -> S>,
}

impl<S> std::fmt::Debug for DockerisedLifecycle<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DockerisedLifecycle")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: DockerisedModel> DockerisedLifecycle<S> {
    /// The validated options.
    #[must_use]
    pub const fn options(&self) -> &DockerisedOptions {
        &self.options
    }

    async fn acquire_image(&self) -> Result<String, FixtainerError> {
        let reference = self.options.image_reference();
        if !self.options.pull {
            match self.runtime.inspect_image(&reference).await {
                Ok(image_id) => return Ok(image_id),
                Err(error) if is_not_found(&error) => {
                    tracing::debug!(image = %reference, "image not present locally; pulling");
                }
                Err(error) => return Err(image_unavailable(&reference, &error)),
            }
        }

        tracing::debug!(image = %reference, "pulling image");
        self.runtime
            .pull_image(&self.options.repository, &self.options.tag)
            .await
            .map_err(|error| image_unavailable(&reference, &error))?;
        self.runtime
            .inspect_image(&reference)
            .await
            .map_err(|error| image_unavailable(&reference, &error))
    }

    async fn start_container(&self, service: &mut DockerisedService) -> Result<(), FixtainerError> {
        let image_id = self.acquire_image().await?;
        let name = format!("{}-{}", self.options.name_prefix(), Uuid::new_v4());
        let ports = self
            .options
            .ports
            .iter()
            .map(|container_port| allocate_port().map(|host_port| (*container_port, host_port)))
            .collect::<Result<BTreeMap<u16, u16>, FixtainerError>>()?;

        let spec = ContainerSpec::new(image_id, name.as_str())?
            .with_ports(&ports)
            .with_run_settings(&self.options.additional_run_settings);
        service.assign(name.clone(), ports, self.options.image_reference());

        let created = self
            .runtime
            .create_container(Some(spec.create_options()), spec.create_body()?)
            .await
            .map_err(|error| ContainerError::CreateFailed {
                message: error.to_string(),
            })?;
        service.attach_container(ContainerHandle {
            id: created.id.clone(),
            name,
        });

        self.runtime
            .start_container(&created.id)
            .await
            .map_err(|error| ContainerError::StartFailed {
                container_id: created.id.clone(),
                message: error.to_string(),
            })?;
        tracing::debug!(
            service = service.name(),
            container_id = %created.id,
            ports = ?service.ports(),
            "service container started"
        );
        Ok(())
    }

    async fn stop_container(&self, service: &mut DockerisedService) -> Result<(), FixtainerError> {
        let Some(container) = service.container().cloned() else {
            return Ok(());
        };

        stop_and_remove(&*self.runtime, &container.id).await?;
        service.detach_container();
        tracing::debug!(container = %container.name, "service container removed");
        Ok(())
    }

    async fn await_readiness(&self, service: &DockerisedService) -> Result<(), FixtainerError> {
        match &self.options.readiness {
            Readiness::Immediate => Ok(()),
            Readiness::LogStream(detectors) => {
                monitor::watch_logs(&*self.runtime, detectors, service).await
            }
            Readiness::HttpPoll { detector, endpoint } => {
                let prober = self.prober.as_deref().ok_or_else(|| {
                    FixtainerError::from(ContainerError::HttpClientFailed {
                        message: String::from("no HTTP prober configured"),
                    })
                })?;
                let port = self.options.ports.first().copied().unwrap_or_default();
                monitor::poll_http(prober, detector, endpoint, service, port).await
            }
            Readiness::Custom(startup_monitor) => startup_monitor
                .watch(service)
                .await
                .map_err(FixtainerError::from),
        }
    }
}

impl<S: DockerisedModel> ServiceLifecycle for DockerisedLifecycle<S> {
    type Service = S;

    fn create_service(&self) -> S {
        S::default()
    }

    fn start<'a>(&'a self, service: &'a mut S) -> LifecycleFuture<'a, ()> {
        Box::pin(self.start_container(service.as_mut()))
    }

    fn stop<'a>(&'a self, service: &'a mut S) -> LifecycleFuture<'a, ()> {
        Box::pin(self.stop_container(service.as_mut()))
    }

    fn wait_until_started<'a>(&'a self, service: &'a S) -> LifecycleFuture<'a, ()> {
        Box::pin(self.await_readiness(service.as_ref()))
    }
}

fn image_unavailable(reference: &str, error: &BollardError) -> FixtainerError {
    FixtainerError::from(ContainerError::ImageUnavailable {
        image: String::from(reference),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests;
