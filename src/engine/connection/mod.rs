//! Socket resolution and container engine connection.
//!
//! The engine endpoint is resolved from explicit configuration first, then
//! from the usual Docker/Podman environment variables, then from the platform
//! default. Connections are established with Bollard.

mod error_classification;
mod health_check;

use bollard::Docker;

use self::error_classification::classify_connection_error;
use crate::error::{ContainerError, FixtainerError};

pub(crate) use self::error_classification::{is_already_stopped, is_not_found};

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for the engine ping.
const PING_TIMEOUT_SECS: u64 = 10;

#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Resolves the engine socket from environment variables.
///
/// The environment is accessed through `mockable::Env` so resolution can be
/// tested without touching the process environment.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a resolver reading from the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Returns the first non-empty value of `DOCKER_HOST`, `CONTAINER_HOST`
    /// or `PODMAN_HOST`.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Picks the socket to use: `configured` when non-empty, then the
    /// environment, then the platform default.
    #[must_use]
    pub fn resolve(&self, configured: Option<&str>) -> String {
        configured
            .filter(|socket| !socket.trim().is_empty())
            .map(String::from)
            .or_else(|| self.resolve_from_env())
            .unwrap_or_else(|| String::from(DEFAULT_SOCKET))
    }
}

/// How an endpoint string should be handed to Bollard.
enum Endpoint {
    Socket(String),
    Http(String),
}

impl Endpoint {
    fn parse(socket: &str) -> Self {
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            return Self::Socket(String::from(socket));
        }
        if let Some(rest) = socket.strip_prefix("tcp://") {
            return Self::Http(format!("http://{rest}"));
        }
        if socket.starts_with("http://") || socket.starts_with("https://") {
            return Self::Http(String::from(socket));
        }
        // Bare paths: `//` or `\\` prefixes are named pipes, anything else a Unix socket.
        if socket.starts_with("\\\\") || socket.starts_with("//") {
            Self::Socket(format!("npipe://{socket}"))
        } else {
            Self::Socket(format!("unix://{socket}"))
        }
    }

    fn uri(&self) -> &str {
        match self {
            Self::Socket(uri) | Self::Http(uri) => uri,
        }
    }
}

/// Connects to Docker- or Podman-compatible engines.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the engine at `socket`.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://` (treated as HTTP), `http://`,
    /// `https://` and bare socket paths.
    ///
    /// # Errors
    ///
    /// Returns a classified `ContainerError` (`SocketNotFound`,
    /// `PermissionDenied` or `ConnectionFailed`) when Bollard cannot set up
    /// the client.
    pub fn connect(socket: &str) -> Result<Docker, FixtainerError> {
        let endpoint = Endpoint::parse(socket);
        let connected = match &endpoint {
            Endpoint::Socket(uri) => Docker::connect_with_socket(
                uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Endpoint::Http(uri) => {
                Docker::connect_with_http(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        };

        connected.map_err(|error| {
            FixtainerError::from(classify_connection_error(&error, endpoint.uri()))
        })
    }

    /// Resolve the socket through `resolver` and connect to it.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        configured: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, FixtainerError> {
        let socket = resolver.resolve(configured);
        tracing::debug!(socket = %socket, "connecting to container engine");
        Self::connect(&socket)
    }

    /// Create a tokio runtime for driving the blocking wrappers.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RuntimeCreationFailed` if the runtime cannot
    /// be built.
    pub fn create_runtime() -> Result<tokio::runtime::Runtime, FixtainerError> {
        tokio::runtime::Runtime::new().map_err(|error| {
            FixtainerError::from(ContainerError::RuntimeCreationFailed {
                message: error.to_string(),
            })
        })
    }
}
