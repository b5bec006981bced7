//! Container runtime operations behind a trait seam.
//!
//! [`ContainerRuntime`] is the narrow set of engine calls the controllers
//! need: image acquisition, create/start/stop/remove, listing by name and log
//! access. It is implemented for `bollard::Docker`; tests substitute fakes so
//! the startup state machine can be exercised without a daemon.

mod spec;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse, ContainerSummary};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptionsBuilder, ListContainersOptions, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptions,
};
use futures_util::{Stream, StreamExt};

pub use self::spec::{ContainerSpec, MANAGED_LABEL};

use crate::engine::{is_already_stopped, is_not_found};
use crate::error::{ContainerError, FixtainerError};

/// Boxed future returned by [`ContainerRuntime`] operations.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// Boxed stream of container output chunks.
pub type LogStream<'a> = Pin<Box<dyn Stream<Item = Result<LogOutput, BollardError>> + Send + 'a>>;

/// Engine operations consumed by the service controllers.
pub trait ContainerRuntime: Send + Sync {
    /// Pull `repository:tag` from its registry.
    fn pull_image(&self, repository: &str, tag: &str) -> RuntimeFuture<'_, ()>;

    /// Look up a local image, returning its ID.
    fn inspect_image(&self, reference: &str) -> RuntimeFuture<'_, String>;

    /// Create a container from Bollard options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> RuntimeFuture<'_, ContainerCreateResponse>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> RuntimeFuture<'_, ()>;

    /// Stop a running container.
    fn stop_container(&self, container_id: &str) -> RuntimeFuture<'_, ()>;

    /// Remove a container, optionally killing it first.
    fn remove_container(&self, container_id: &str, force: bool) -> RuntimeFuture<'_, ()>;

    /// List containers, running or not, whose name matches `name`, or carrying
    /// `label` when given.
    fn list_containers(&self, filter: ContainerFilter) -> RuntimeFuture<'_, Vec<ContainerSummary>>;

    /// Follow a container's stdout and stderr from the start of its output.
    fn log_stream<'a>(&'a self, container_id: &'a str) -> LogStream<'a>;

    /// Everything the container has written so far, as one string.
    fn logs(&self, container_id: &str) -> RuntimeFuture<'_, String>;
}

/// Selection criteria for [`ContainerRuntime::list_containers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    name: Option<String>,
    label: Option<String>,
}

impl ContainerFilter {
    /// Match containers by name.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            label: None,
        }
    }

    /// Match containers carrying a label (`key` or `key=value`).
    #[must_use]
    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            name: None,
            label: Some(label.into()),
        }
    }

    fn into_filters(self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        if let Some(name) = self.name {
            filters.insert(String::from("name"), vec![name]);
        }
        if let Some(label) = self.label {
            filters.insert(String::from("label"), vec![label]);
        }
        filters
    }
}

impl ContainerRuntime for Docker {
    fn pull_image(&self, repository: &str, tag: &str) -> RuntimeFuture<'_, ()> {
        let options = CreateImageOptionsBuilder::new()
            .from_image(repository)
            .tag(tag)
            .build();
        Box::pin(async move {
            let mut progress = Box::pin(Self::create_image(self, Some(options), None, None));
            while let Some(update) = progress.next().await {
                update?;
            }
            Ok(())
        })
    }

    fn inspect_image(&self, reference: &str) -> RuntimeFuture<'_, String> {
        let reference_owned = String::from(reference);
        Box::pin(async move {
            let image = Self::inspect_image(self, &reference_owned).await?;
            Ok(image.id.unwrap_or(reference_owned))
        })
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> RuntimeFuture<'_, ContainerCreateResponse> {
        Box::pin(async move { Self::create_container(self, options, body).await })
    }

    fn start_container(&self, container_id: &str) -> RuntimeFuture<'_, ()> {
        let id = String::from(container_id);
        Box::pin(async move { Self::start_container(self, &id, None::<StartContainerOptions>).await })
    }

    fn stop_container(&self, container_id: &str) -> RuntimeFuture<'_, ()> {
        let id = String::from(container_id);
        Box::pin(async move { Self::stop_container(self, &id, None::<StopContainerOptions>).await })
    }

    fn remove_container(&self, container_id: &str, force: bool) -> RuntimeFuture<'_, ()> {
        let id = String::from(container_id);
        let options = RemoveContainerOptionsBuilder::new().force(force).build();
        Box::pin(async move { Self::remove_container(self, &id, Some(options)).await })
    }

    fn list_containers(&self, filter: ContainerFilter) -> RuntimeFuture<'_, Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all: true,
            filters: Some(filter.into_filters()),
            ..ListContainersOptions::default()
        };
        Box::pin(async move { Self::list_containers(self, Some(options)).await })
    }

    fn log_stream<'a>(&'a self, container_id: &'a str) -> LogStream<'a> {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .build();
        Box::pin(Self::logs(self, container_id, Some(options)))
    }

    fn logs(&self, container_id: &str) -> RuntimeFuture<'_, String> {
        let options = LogsOptionsBuilder::new()
            .follow(false)
            .stdout(true)
            .stderr(true)
            .build();
        let id = String::from(container_id);
        Box::pin(async move {
            let mut output = Box::pin(Self::logs(self, &id, Some(options)));
            let mut dump = String::new();
            while let Some(chunk) = output.next().await {
                dump.push_str(&String::from_utf8_lossy(&chunk?.into_bytes()));
            }
            Ok(dump)
        })
    }
}

/// Stop and force-remove a container.
///
/// A container that is already stopped or already gone is not an error.
/// Returns `false` when the container no longer existed.
///
/// # Errors
///
/// Returns `ContainerError::StopFailed` or `ContainerError::RemoveFailed`
/// for any other engine error; the container is left in place.
pub async fn stop_and_remove(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
) -> Result<bool, FixtainerError> {
    let mut existed = true;
    if let Err(error) = runtime.stop_container(container_id).await {
        if is_not_found(&error) {
            existed = false;
        } else if !is_already_stopped(&error) {
            return Err(FixtainerError::from(ContainerError::StopFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            }));
        }
    }

    if let Err(error) = runtime.remove_container(container_id, true).await {
        if !is_not_found(&error) {
            return Err(FixtainerError::from(ContainerError::RemoveFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            }));
        }
        existed = false;
    }
    Ok(existed)
}
