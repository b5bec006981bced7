//! Configuration loading with layered precedence.
//!
//! This module loads configuration with the precedence order (lowest to
//! highest): application defaults, configuration file, environment variables,
//! command-line arguments.
//!
//! Layers are composed with `MergeComposer` rather than `OrthoConfig::load()`
//! because the `Cli` struct owns subcommand dispatch, and because typed
//! environment values must fail fast instead of being skipped.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `FIXTAINER_STARTUP_PULL=maybe` instead of `true`/`false`) return an error
//! immediately. String fields (e.g., `FIXTAINER_ENGINE_SOCKET`) are always
//! accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::{DefaultEnv, Env};
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli, Commands};
use crate::error::{ConfigError, FixtainerError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`).
    Bool,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `FIXTAINER_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["startup", "pull"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "FIXTAINER_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "FIXTAINER_SERVICES_FILE",
        path: &["services_file"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "FIXTAINER_STARTUP_START_TIMEOUT_SECS",
        path: &["startup", "start_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "FIXTAINER_STARTUP_START_TRIES",
        path: &["startup", "start_tries"],
        var_type: EnvVarType::U32,
    },
    EnvVarSpec {
        env_var: "FIXTAINER_STARTUP_PULL",
        path: &["startup", "pull"],
        var_type: EnvVarType::Bool,
    },
];

/// Returns the environment variable names recognised by the config loader.
///
/// Tests use this to clear every `FIXTAINER_*` variable without keeping a
/// second list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Read a TOML configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or(current_dir.as_path());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {error}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|error| ConfigError::ParseError {
            message: format!("failed to read {path}: {error}"),
        })?;

    let value = toml::from_str::<Value>(&content).map_err(|error| ConfigError::ParseError {
        message: format!("failed to parse {path}: {error}"),
    })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// Sources, lowest precedence first:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `FIXTAINER_CONFIG_PATH` or discovery)
/// 3. Environment variables prefixed with `FIXTAINER_`
/// 4. Command-line arguments, including the start options of `up`
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is malformed, a typed
/// environment variable cannot be parsed, the merged layers do not form a
/// valid configuration, or the start options fail validation.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &DefaultEnv::new())
}

/// [`load_config`] reading environment variables through `env`.
///
/// # Errors
///
/// As for [`load_config`].
pub fn load_config_with_env(cli: &Cli, env: &impl Env) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults = serde_json::to_value(AppConfig::default()).map_err(|error| {
        ConfigError::ParseError {
            message: format!("failed to serialise defaults: {error}"),
        }
    })?;
    composer.push_defaults(defaults);

    let config_path = cli
        .config
        .clone()
        .filter(|path| path.exists())
        .or_else(discover_config_file);
    if let Some(ref path) = config_path {
        tracing::debug!(path = %path, "loading configuration file");
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.startup.validate()?;
    Ok(config)
}

fn discover_config_file() -> Option<Utf8PathBuf> {
    ConfigDiscovery::builder("fixtainer")
        .env_var("FIXTAINER_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".fixtainer.toml")
        .build()
        .candidates()
        .into_iter()
        .filter(|path| path.exists())
        .find_map(|path| Utf8PathBuf::try_from(path).ok())
}

/// Collect `FIXTAINER_*` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` naming the variable when a typed
/// value cannot be parsed.
fn collect_env_vars(env: &impl Env) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |expected: &str, raw: &str| -> FixtainerError {
        ConfigError::InvalidValue {
            field: String::from(spec.env_var),
            reason: format!("expected {expected}, got '{raw}'"),
        }
        .into()
    };

    match spec.var_type {
        EnvVarType::String => Ok(Value::String(raw_value)),
        EnvVarType::Bool => raw_value
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid("bool (true/false)", &raw_value)),
        EnvVarType::U32 => raw_value
            .parse::<u32>()
            .map(Value::from)
            .map_err(|_| invalid("unsigned 32-bit integer", &raw_value)),
        EnvVarType::U64 => raw_value
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid("unsigned integer", &raw_value)),
    }
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(String::from(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(object) = entry.as_object_mut() else {
            return;
        };
        current = object;
    }

    current.insert(String::from(field), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        insert_at_path(&mut overrides, &["engine_socket"], Value::String(socket.clone()));
    }
    if let Some(ref services_file) = cli.services_file {
        insert_at_path(
            &mut overrides,
            &["services_file"],
            Value::String(String::from(services_file.as_str())),
        );
    }

    if let Commands::Up(ref args) = cli.command {
        if let Some(secs) = args.start_timeout_secs {
            insert_at_path(&mut overrides, &["startup", "start_timeout_secs"], Value::from(secs));
        }
        if let Some(tries) = args.start_tries {
            insert_at_path(&mut overrides, &["startup", "start_tries"], Value::from(tries));
        }
        if args.no_pull {
            insert_at_path(&mut overrides, &["startup", "pull"], Value::Bool(false));
        }
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
