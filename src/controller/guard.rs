//! Scoped ownership of a started service.

use std::ops::{Deref, DerefMut};

use tokio::runtime::Handle;

use super::{ServiceController, ServiceLifecycle};
use crate::error::FixtainerError;
use crate::service::Service;

/// A started service that is stopped when the guard is released or dropped.
///
/// Dereferences to the service model so test code can read its host and
/// ports directly.
pub struct ServiceGuard<'c, L: ServiceLifecycle> {
    controller: &'c ServiceController<L>,
    runtime: Handle,
    service: L::Service,
    released: bool,
}

impl<'c, L: ServiceLifecycle> ServiceGuard<'c, L> {
    pub(super) const fn new(
        controller: &'c ServiceController<L>,
        runtime: Handle,
        service: L::Service,
    ) -> Self {
        Self {
            controller,
            runtime,
            service,
            released: false,
        }
    }

    /// Stop the service now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns the controller's stop error.
    pub fn release(mut self) -> Result<(), FixtainerError> {
        self.released = true;
        self.runtime
            .block_on(self.controller.stop_service_async(&mut self.service))
    }
}

impl<L: ServiceLifecycle> Deref for ServiceGuard<'_, L> {
    type Target = L::Service;

    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

impl<L: ServiceLifecycle> DerefMut for ServiceGuard<'_, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.service
    }
}

impl<L: ServiceLifecycle> Drop for ServiceGuard<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let runtime = &self.runtime;
        let controller = self.controller;
        let service = &mut self.service;
        // Blocking inside an async context panics, so the stop runs on a
        // scoped thread of its own.
        let outcome = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    runtime
                        .block_on(controller.stop_service_async(service))
                        .map_err(|error| error.to_string())
                })
                .join()
        });

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => tracing::warn!(
                service = self.service.name(),
                error = %message,
                "failed to stop service on scope exit"
            ),
            Err(_) => tracing::warn!(
                service = self.service.name(),
                "service cleanup panicked on scope exit"
            ),
        }
    }
}
