//! Engine liveness check used before any container is created.

use std::time::Duration;

use bollard::Docker;

use super::{EngineConnector, PING_TIMEOUT_SECS, SocketResolver};
use crate::error::{ContainerError, FixtainerError};

impl EngineConnector {
    /// Ping the engine, failing if it does not answer within the timeout.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckTimeout` if the engine does not
    /// answer in time and `ContainerError::HealthCheckFailed` if it answers
    /// with an error.
    pub async fn ping_async(docker: &Docker) -> Result<(), FixtainerError> {
        let timeout = Duration::from_secs(PING_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| {
                FixtainerError::from(ContainerError::HealthCheckTimeout {
                    seconds: PING_TIMEOUT_SECS,
                })
            })?
            .map_err(|error| {
                FixtainerError::from(ContainerError::HealthCheckFailed {
                    message: error.to_string(),
                })
            })?;
        Ok(())
    }

    /// Resolve, connect and ping in one step (async version).
    ///
    /// # Errors
    ///
    /// Returns connection errors from [`Self::connect`] and ping errors from
    /// [`Self::ping_async`].
    pub async fn connect_and_verify_async<E: mockable::Env>(
        configured: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, FixtainerError> {
        let docker = Self::connect_with_fallback(configured, resolver)?;
        Self::ping_async(&docker).await?;
        Ok(docker)
    }

    /// Resolve, connect and ping, blocking on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::connect_and_verify_async`].
    pub fn connect_and_verify<E: mockable::Env>(
        runtime: &tokio::runtime::Handle,
        configured: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, FixtainerError> {
        runtime.block_on(Self::connect_and_verify_async(configured, resolver))
    }
}
