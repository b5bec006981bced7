//! Configuration system for the `fixtainer` binary.
//!
//! This module provides the configuration structures, CLI definitions and the
//! layered loader. Precedence: CLI flags override environment variables, which
//! override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/fixtainer/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//! services_file = "/home/user/project/fixtainer.services.toml"
//!
//! [startup]
//! start_timeout_secs = 120
//! start_tries = 3
//! pull = false
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, StopArgs, UpArgs};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, DEFAULT_SERVICES_FILE, StartupConfig};
