//! Configuration data types for fixtainer.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FixtainerError};
use crate::factory::ControllerDefaults;

/// Catalog file read when neither the configuration nor the CLI names one.
pub const DEFAULT_SERVICES_FILE: &str = "fixtainer.services.toml";

/// Start options applied to every service the binary starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Deadline in seconds for each readiness wait. `None` waits forever.
    pub start_timeout_secs: Option<u64>,

    /// Maximum number of start attempts.
    pub start_tries: u32,

    /// Pull the image on every start.
    pub pull: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: Some(60),
            start_tries: 3,
            pull: true,
        }
    }
}

impl StartupConfig {
    /// Validates the start options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `start_tries` or
    /// `start_timeout_secs` is zero.
    pub fn validate(&self) -> Result<(), FixtainerError> {
        if self.start_tries == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("startup.start_tries"),
                reason: String::from("must be at least 1"),
            }
            .into());
        }
        if self.start_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: String::from("startup.start_timeout_secs"),
                reason: String::from("must be positive; omit it to wait without a deadline"),
            }
            .into());
        }
        Ok(())
    }

    /// The start options as controller defaults.
    #[must_use]
    pub fn controller_defaults(&self) -> ControllerDefaults {
        ControllerDefaults {
            start_timeout: self.start_timeout_secs.map(Duration::from_secs),
            start_tries: Some(self.start_tries),
            pull: self.pull,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `FIXTAINER_CONFIG_PATH` environment variable
/// 2. `.fixtainer.toml` in the current working directory
/// 3. `.fixtainer.toml` in the home directory
/// 4. `~/.config/fixtainer/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "FIXTAINER",
    post_merge_hook,
    discovery(
        app_name = "fixtainer",
        env_var = "FIXTAINER_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".fixtainer.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Path to the service catalog.
    pub services_file: Option<Utf8PathBuf>,

    /// Start options.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub startup: StartupConfig,
}

impl AppConfig {
    /// The catalog path, falling back to [`DEFAULT_SERVICES_FILE`].
    #[must_use]
    pub fn services_path(&self) -> Utf8PathBuf {
        self.services_file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_SERVICES_FILE))
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // A blank socket means "use the environment", as if it were unset.
        if self
            .engine_socket
            .as_deref()
            .is_some_and(|socket| socket.trim().is_empty())
        {
            self.engine_socket = None;
        }
        if self
            .services_file
            .as_ref()
            .is_some_and(|path| path.as_str().trim().is_empty())
        {
            self.services_file = None;
        }
        Ok(())
    }
}
