//! Semantic error types for fixtainer.
//!
//! Errors are grouped by concern using `thiserror` enums so callers can inspect
//! them and decide whether to retry. Opaque reporting (`eyre::Report`) is only
//! used at the binary boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
///
/// Controller construction raises these synchronously; they are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// Two mutually exclusive options were configured together.
    #[error("cannot set '{first}' in conjunction with '{second}'")]
    ConflictingOptions {
        /// The option that excludes the other.
        first: String,
        /// The option that was also set.
        second: String,
    },

    /// One of a pair of options was configured without the other.
    #[error("'{present}' requires '{missing}' to be set as well")]
    IncompleteOption {
        /// The option that was set.
        present: String,
        /// The companion option that is missing.
        missing: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while talking to the container engine.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// A tokio runtime for a blocking operation could not be created.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// The service image could not be pulled or found locally.
    #[error("image '{image}' is unavailable: {message}")]
    ImageUnavailable {
        /// The image reference (`repository:tag`).
        image: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to create a container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to stop a container.
    #[error("failed to stop container '{container_id}': {message}")]
    StopFailed {
        /// The ID of the container that failed to stop.
        container_id: String,
        /// A description of the stop failure.
        message: String,
    },

    /// Failed to remove a container.
    #[error("failed to remove container '{container_id}': {message}")]
    RemoveFailed {
        /// The ID of the container that failed to be removed.
        container_id: String,
        /// A description of the removal failure.
        message: String,
    },

    /// Failed to list containers.
    #[error("failed to list containers: {message}")]
    ListFailed {
        /// A description of the listing failure.
        message: String,
    },

    /// Failed to read container logs.
    #[error("failed to read logs of container '{container_id}': {message}")]
    LogsFailed {
        /// The ID of the container whose logs were requested.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// No free local TCP port could be obtained for a service port.
    #[error("failed to allocate a host port: {message}")]
    PortAllocationFailed {
        /// A description of the failure.
        message: String,
    },

    /// The HTTP client used for readiness probing could not be built.
    #[error("failed to build HTTP client: {message}")]
    HttpClientFailed {
        /// A description of the failure.
        message: String,
    },
}

/// Errors signalled while bringing a service up.
///
/// `Transient` failures are consumed by the retry loop and only surface once
/// the attempt budget is spent (as `RetriesExhausted`). `Persistent` failures
/// abort the start immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceStartError {
    /// A failure that may go away on another attempt.
    #[error("transient service start failure: {reason}")]
    Transient {
        /// What was observed (log line, timeout, stream closure).
        reason: String,
    },

    /// A failure that will recur no matter how often the start is retried.
    #[error("persistent service start failure: {reason}")]
    Persistent {
        /// What was observed, typically the offending log line.
        reason: String,
    },

    /// Every permitted start attempt failed without a persistent failure.
    #[error("service could not be started after {attempts} attempt(s)")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

impl ServiceStartError {
    /// Build a transient failure from anything displayable.
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Build a persistent failure from anything displayable.
    #[must_use]
    pub fn persistent(reason: impl Into<String>) -> Self {
        Self::Persistent {
            reason: reason.into(),
        }
    }

    /// Whether this failure makes the start eligible for another attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Top-level error type for fixtainer.
#[derive(Debug, Error)]
pub enum FixtainerError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// The service could not be brought up.
    #[error(transparent)]
    Start(#[from] ServiceStartError),
}

impl FixtainerError {
    /// Whether the error is a transient start failure eligible for retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Start(ServiceStartError::Transient { .. }))
    }
}

/// A specialised `Result` type for fixtainer operations.
pub type Result<T> = std::result::Result<T, FixtainerError>;
