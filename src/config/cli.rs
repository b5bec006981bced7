//! Command-line argument definitions for fixtainer.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for fixtainer.
#[derive(Debug, Parser)]
#[command(name = "fixtainer")]
#[command(
    author,
    version,
    about = "Ephemeral containerised services for integration tests"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Path to the service catalog.
    #[arg(long, global = true)]
    pub services_file: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a service from the catalog and keep it running until Ctrl-C.
    Up(UpArgs),

    /// Stop and remove a service container.
    Stop(StopArgs),

    /// List containers started by fixtainer.
    Ps,
}

/// Arguments for the `up` subcommand.
#[derive(Debug, Parser)]
pub struct UpArgs {
    /// Name of the service in the catalog.
    #[arg(required = true)]
    pub service: String,

    /// Deadline in seconds for each readiness wait.
    #[arg(long)]
    pub start_timeout_secs: Option<u64>,

    /// Maximum number of start attempts.
    #[arg(long)]
    pub start_tries: Option<u32>,

    /// Use a local copy of the image when one exists.
    #[arg(long)]
    pub no_pull: bool,
}

/// Arguments for the `stop` subcommand.
#[derive(Debug, Parser)]
pub struct StopArgs {
    /// Container name or ID to stop.
    #[arg(required = true)]
    pub container: String,
}
