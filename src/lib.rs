//! Ephemeral containerised services for integration tests.
//!
//! `fixtainer` starts a throwaway service (a database, a broker, an HTTP API)
//! in a Docker- or Podman-managed container, publishes its ports on free host
//! ports and blocks until the service is actually ready. Readiness is decided
//! by detectors applied to the container's log output, by polling an HTTP
//! endpoint, or by a custom monitor. Failed starts are classified as
//! transient (retried) or persistent (aborted), and containers are always
//! cleaned up.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fixtainer::controller::dockerised::DockerisedControllerBuilder;
//! use fixtainer::detector::LogDetector;
//! use fixtainer::engine::{EngineConnector, SocketResolver};
//! use fixtainer::service::{DockerisedService, Service};
//!
//! # fn main() -> fixtainer::error::Result<()> {
//! let runtime = EngineConnector::create_runtime()?;
//! let env = mockable::DefaultEnv::new();
//! let docker = EngineConnector::connect_and_verify(
//!     runtime.handle(),
//!     None,
//!     &SocketResolver::new(&env),
//! )?;
//!
//! let controller = DockerisedControllerBuilder::<DockerisedService>::new("redis", "7")
//!     .ports([6379])
//!     .start_log_detector(LogDetector::contains("Ready to accept connections"))
//!     .start_timeout(Duration::from_secs(30))
//!     .start_tries(3)
//!     .build(Arc::new(docker))?;
//!
//! let redis = controller.start_scoped(runtime.handle())?;
//! let port = redis.host_port(6379);
//! # let _ = (port, redis.name());
//! redis.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration of the `fixtainer` binary (CLI > env > file > defaults)
//! - [`controller`]: Retry driver, scoped cleanup and the dockerised lifecycle
//! - [`detector`]: Log and HTTP readiness detectors
//! - [`engine`]: Container engine connection and runtime operations
//! - [`error`]: Semantic error types
//! - [`factory`]: Controller templates and declarative service catalogs
//! - [`service`]: Service models and port allocation

pub mod config;
pub mod controller;
pub mod detector;
pub mod engine;
pub mod error;
pub mod factory;
pub mod service;
