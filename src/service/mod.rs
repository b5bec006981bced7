//! Service models handed back to test code.
//!
//! A service model is created fresh for every start, filled in by its
//! controller while the service comes up, and emptied again on stop. Test code
//! reads [`Service::host`] and [`Service::ports`] to reach the running service.

mod ports;

use std::collections::BTreeMap;

use smart_default::SmartDefault;

pub use self::ports::allocate_port;

/// Connection contract of a running service.
pub trait Service: Send + Sync {
    /// Unique name of this instance (empty until started).
    fn name(&self) -> &str;

    /// Address the service is reachable on.
    fn host(&self) -> &str;

    /// Declared container port mapped to the allocated host port.
    fn ports(&self) -> &BTreeMap<u16, u16>;
}

/// Identity of the container backing a [`DockerisedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Engine-assigned container ID.
    pub id: String,
    /// Container name.
    pub name: String,
}

/// A service running in a Docker- or Podman-managed container.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault)]
pub struct DockerisedService {
    name: String,
    ports: BTreeMap<u16, u16>,
    #[default(String::from("localhost"))]
    host: String,
    container: Option<ContainerHandle>,
    controller: Option<String>,
}

impl DockerisedService {
    /// The backing container, present from start until a successful stop.
    #[must_use]
    pub const fn container(&self) -> Option<&ContainerHandle> {
        self.container.as_ref()
    }

    /// Image reference of the controller that started this service.
    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    /// Host port allocated for `container_port`.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    /// Whether a container currently backs this service.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.container.is_some()
    }

    /// Override the address the service is reached on.
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub(crate) fn assign(&mut self, name: String, ports: BTreeMap<u16, u16>, controller: String) {
        self.name = name;
        self.ports = ports;
        self.controller = Some(controller);
    }

    pub(crate) fn attach_container(&mut self, container: ContainerHandle) {
        self.container = Some(container);
    }

    pub(crate) fn detach_container(&mut self) -> Option<ContainerHandle> {
        self.container.take()
    }
}

impl Service for DockerisedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn ports(&self) -> &BTreeMap<u16, u16> {
        &self.ports
    }
}

impl AsRef<Self> for DockerisedService {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl AsMut<Self> for DockerisedService {
    fn as_mut(&mut self) -> &mut Self {
        self
    }
}

/// Model types a dockerised controller can populate.
///
/// Custom models wrap a [`DockerisedService`] and add their own fields
/// (credentials, database names, and so on). They are created with
/// `Default::default()` at the start of every `start_service` call.
pub trait DockerisedModel:
    Service + Default + AsRef<DockerisedService> + AsMut<DockerisedService> + 'static
{
}

impl<T> DockerisedModel for T where
    T: Service + Default + AsRef<DockerisedService> + AsMut<DockerisedService> + 'static
{
}
