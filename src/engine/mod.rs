//! Container engine connection and runtime operations.
//!
//! The socket endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `FIXTAINER_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)
//!
//! Once connected, controllers talk to the engine exclusively through the
//! [`ContainerRuntime`] trait.

mod connection;
mod runtime;

pub use connection::{EngineConnector, SocketResolver};
pub(crate) use connection::{is_already_stopped, is_not_found};
pub use runtime::{
    ContainerFilter, ContainerRuntime, ContainerSpec, LogStream, MANAGED_LABEL, RuntimeFuture,
    stop_and_remove,
};
