//! `fixtainer` application entry point.
//!
//! Starts catalogued services for manual testing, stops them and lists the
//! containers fixtainer manages. It uses `eyre` for opaque error handling at
//! the application boundary, converting domain-specific errors into
//! human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/fixtainer/config.toml` or path from `FIXTAINER_CONFIG_PATH`)
//! 3. Environment variables (`FIXTAINER_*`)
//! 4. Command-line arguments

use std::sync::Arc;

use bollard::models::ContainerSummary;
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use fixtainer::config::{AppConfig, Cli, Commands, StopArgs, UpArgs, load_config};
use fixtainer::engine::{
    ContainerFilter, ContainerRuntime, EngineConnector, MANAGED_LABEL, SocketResolver,
    stop_and_remove,
};
use fixtainer::error::{ContainerError, Result as FixtainerResult};
use fixtainer::factory::ServiceCatalog;
use fixtainer::service::{DockerisedService, Service};
use mockable::DefaultEnv;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "fixtainer=info";

/// Application entry point.
///
/// Installs the log subscriber, loads configuration with layered precedence,
/// then dispatches to the subcommand handler.
fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).map_err(Report::from)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
fn run(cli: &Cli, config: &AppConfig) -> FixtainerResult<()> {
    let runtime = EngineConnector::create_runtime()?;
    let env = DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    let docker = EngineConnector::connect_and_verify(
        runtime.handle(),
        config.engine_socket.as_deref(),
        &resolver,
    )?;
    let engine: Arc<dyn ContainerRuntime> = Arc::new(docker);

    match &cli.command {
        Commands::Up(args) => up(&runtime, engine, config, args),
        Commands::Stop(args) => stop(&runtime, engine.as_ref(), args),
        Commands::Ps => list(&runtime, engine.as_ref()),
    }
}

/// Start a catalogued service and keep it until Ctrl-C.
fn up(
    runtime: &Runtime,
    engine: Arc<dyn ContainerRuntime>,
    config: &AppConfig,
    args: &UpArgs,
) -> FixtainerResult<()> {
    let catalog = ServiceCatalog::load(&config.services_path())?;
    let definition = catalog.require(&args.service)?;
    let controller = definition
        .build::<DockerisedService>(&config.startup.controller_defaults(), engine)?;

    tracing::info!(
        service = %args.service,
        image = %controller.lifecycle().options().image_reference(),
        "starting service"
    );
    let service = controller.start_scoped(runtime.handle())?;
    print_service(&args.service, &service);

    if let Err(error) = runtime.block_on(tokio::signal::ctrl_c()) {
        tracing::warn!(error = %error, "could not wait for Ctrl-C; stopping now");
    }
    tracing::info!(service = %args.service, "stopping service");
    service.release()
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_service(label: &str, service: &DockerisedService) {
    println!("{label} is ready as {}", service.name());
    for (container_port, host_port) in service.ports() {
        println!("  {}:{host_port} -> {container_port}/tcp", service.host());
    }
    println!("Press Ctrl-C to stop.");
}

/// Stop and remove a container by name or ID.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn stop(runtime: &Runtime, engine: &dyn ContainerRuntime, args: &StopArgs) -> FixtainerResult<()> {
    if runtime.block_on(stop_and_remove(engine, &args.container))? {
        println!("Removed {}", args.container);
    } else {
        println!("No container named {}", args.container);
    }
    Ok(())
}

/// List containers carrying the managed label.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn list(runtime: &Runtime, engine: &dyn ContainerRuntime) -> FixtainerResult<()> {
    let filter = ContainerFilter::by_label(format!("{MANAGED_LABEL}=true"));
    let containers = runtime
        .block_on(engine.list_containers(filter))
        .map_err(|error| ContainerError::ListFailed {
            message: error.to_string(),
        })?;

    if containers.is_empty() {
        println!("No fixtainer containers.");
        return Ok(());
    }
    for summary in &containers {
        println!("{}", describe(summary));
    }
    Ok(())
}

fn describe(summary: &ContainerSummary) -> String {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map_or("<unnamed>", |name| name.trim_start_matches('/'));
    let image = summary.image.as_deref().unwrap_or("<unknown image>");
    let status = summary.status.as_deref().unwrap_or("");
    format!("{name}\t{image}\t{status}")
}
