//! Service start/stop lifecycle with retries.
//!
//! [`ServiceController`] is a backend-agnostic driver: it creates a fresh
//! service model, starts it, waits for readiness, and retries on transient
//! failures. The backend-specific capabilities (start, stop, wait until
//! started) come from a [`ServiceLifecycle`] implementation, such as the
//! dockerised lifecycle in [`dockerised`].
//!
//! Each operation exists as an `*_async` method and as a blocking wrapper
//! that takes a `tokio::runtime::Handle`. The blocking wrappers must not be
//! called from within an async context, and the handle should belong to a
//! multi-threaded runtime so engine I/O is driven while the caller blocks.

pub mod dockerised;
mod guard;

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{FixtainerError, ServiceStartError};
use crate::service::Service;

pub use self::guard::ServiceGuard;

/// Boxed future returned by [`ServiceLifecycle`] operations.
pub type LifecycleFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FixtainerError>> + Send + 'a>>;

/// Backend capabilities driven by [`ServiceController`].
pub trait ServiceLifecycle: Send + Sync {
    /// Model populated for each started service.
    type Service: Service;

    /// A fresh, not yet started model.
    fn create_service(&self) -> Self::Service;

    /// Bring up the backing resources for `service`.
    fn start<'a>(&'a self, service: &'a mut Self::Service) -> LifecycleFuture<'a, ()>;

    /// Release the backing resources of `service`.
    ///
    /// Must succeed on a never-started or already-stopped service.
    fn stop<'a>(&'a self, service: &'a mut Self::Service) -> LifecycleFuture<'a, ()>;

    /// Resolve once `service` is ready for use.
    ///
    /// Fails with `ServiceStartError::Transient` for failures worth another
    /// attempt and `ServiceStartError::Persistent` for ones that are not.
    fn wait_until_started<'a>(&'a self, service: &'a Self::Service) -> LifecycleFuture<'a, ()>;
}

/// How long to wait for readiness and how often to try.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartPolicy {
    /// Deadline for each readiness wait; `None` waits indefinitely.
    pub start_timeout: Option<Duration>,
    /// Maximum number of start attempts; `None` keeps trying.
    pub start_tries: Option<NonZeroU32>,
}

impl StartPolicy {
    fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.start_tries
            .is_none_or(|tries| attempts_made < tries.get())
    }
}

/// Drives a [`ServiceLifecycle`] through start, readiness and stop.
#[derive(Debug)]
pub struct ServiceController<L> {
    lifecycle: L,
    policy: StartPolicy,
}

impl<L: ServiceLifecycle> ServiceController<L> {
    /// Wrap `lifecycle` with the given start policy.
    #[must_use]
    pub const fn new(lifecycle: L, policy: StartPolicy) -> Self {
        Self { lifecycle, policy }
    }

    /// The backend lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &L {
        &self.lifecycle
    }

    /// The start policy.
    #[must_use]
    pub const fn policy(&self) -> StartPolicy {
        self.policy
    }

    /// Start a new service and wait until it is ready.
    ///
    /// Each attempt after the first stops the previous attempt's resources
    /// before starting again. A timeout or transient failure moves on to the
    /// next attempt. A persistent failure, or any error from the backend
    /// itself, ends the start immediately. Before an error is returned the
    /// current attempt's resources are stopped on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns `ServiceStartError::Persistent` when readiness detection
    /// reports a persistent failure, `ServiceStartError::RetriesExhausted`
    /// when every permitted attempt failed transiently, and the backend's
    /// error when starting or stopping a container fails.
    pub async fn start_service_async(&self) -> Result<L::Service, FixtainerError> {
        let mut service = self.lifecycle.create_service();
        let mut attempts: u32 = 0;

        while self.policy.allows_attempt(attempts) {
            if attempts > 0 {
                self.lifecycle.stop(&mut service).await?;
            }
            attempts = attempts.saturating_add(1);
            tracing::debug!(attempt = attempts, "starting service");

            if let Err(error) = self.lifecycle.start(&mut service).await {
                self.discard(&mut service).await;
                return Err(error);
            }

            match self.wait_for_readiness(&service).await {
                Ok(()) => {
                    tracing::info!(service = service.name(), attempt = attempts, "service is ready");
                    return Ok(service);
                }
                Err(error) if error.is_transient() => {
                    tracing::warn!(
                        service = service.name(),
                        attempt = attempts,
                        error = %error,
                        "service start attempt failed"
                    );
                }
                Err(error) => {
                    self.discard(&mut service).await;
                    return Err(error);
                }
            }
        }

        self.discard(&mut service).await;
        Err(FixtainerError::from(ServiceStartError::RetriesExhausted { attempts }))
    }

    /// Start a new service, blocking on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::start_service_async`].
    pub fn start_service(&self, runtime: &Handle) -> Result<L::Service, FixtainerError> {
        runtime.block_on(self.start_service_async())
    }

    /// Start a new service whose resources are released when the returned
    /// guard goes out of scope.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::start_service_async`].
    pub fn start_scoped(&self, runtime: &Handle) -> Result<ServiceGuard<'_, L>, FixtainerError> {
        let service = self.start_service(runtime)?;
        Ok(ServiceGuard::new(self, runtime.clone(), service))
    }

    /// Stop `service` and release its resources.
    ///
    /// Stopping a service that was never started, or stopping it twice, is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the resources exist but cannot be
    /// released.
    pub async fn stop_service_async(&self, service: &mut L::Service) -> Result<(), FixtainerError> {
        self.lifecycle.stop(service).await
    }

    /// Stop `service`, blocking on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::stop_service_async`].
    pub fn stop_service(&self, runtime: &Handle, service: &mut L::Service) -> Result<(), FixtainerError> {
        runtime.block_on(self.stop_service_async(service))
    }

    async fn wait_for_readiness(&self, service: &L::Service) -> Result<(), FixtainerError> {
        let waiting = self.lifecycle.wait_until_started(service);
        let Some(limit) = self.policy.start_timeout else {
            return waiting.await;
        };

        // Expiry drops the wait; the container keeps running until the next
        // attempt stops it.
        tokio::time::timeout(limit, waiting).await.unwrap_or_else(|_elapsed| {
            Err(FixtainerError::from(ServiceStartError::transient(format!(
                "service did not become ready within {limit:?}"
            ))))
        })
    }

    async fn discard(&self, service: &mut L::Service) {
        if let Err(error) = self.lifecycle.stop(service).await {
            tracing::warn!(
                service = service.name(),
                error = %error,
                "failed to clean up after unsuccessful start"
            );
        }
    }
}
