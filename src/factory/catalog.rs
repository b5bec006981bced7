//! Named service definitions loaded from TOML.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::toml;
use serde::{Deserialize, Serialize};

use super::ServiceDefinition;
use crate::error::{ConfigError, FixtainerError};

/// Service definitions keyed by name, read from `[services.<name>]` tables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceCatalog {
    #[serde(default)]
    services: BTreeMap<String, ServiceDefinition>,
}

impl ServiceCatalog {
    /// Parse a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` when the text is not a valid catalog.
    pub fn from_toml_str(content: &str) -> Result<Self, FixtainerError> {
        toml::from_str(content).map_err(|error| {
            FixtainerError::from(ConfigError::ParseError {
                message: error.to_string(),
            })
        })
    }

    /// Read and parse the catalog at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` when the file does not exist and
    /// `ConfigError::ParseError` when it cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, FixtainerError> {
        let current_dir = Utf8PathBuf::from(".");
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or(current_dir.as_path());
        let file_name = path.file_name().unwrap_or(path.as_str());

        let content = Dir::open_ambient_dir(parent, ambient_authority())
            .and_then(|dir| dir.read_to_string(file_name))
            .map_err(|error| read_error(path, &error))?;

        Self::from_toml_str(&content).map_err(|error| match error {
            FixtainerError::Config(ConfigError::ParseError { message }) => {
                FixtainerError::from(ConfigError::ParseError {
                    message: format!("failed to parse {path}: {message}"),
                })
            }
            other => other,
        })
    }

    /// The definition called `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    /// The definition called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` naming `services.<name>` when
    /// the catalog has no such service.
    pub fn require(&self, name: &str) -> Result<&ServiceDefinition, FixtainerError> {
        self.get(name).ok_or_else(|| {
            FixtainerError::from(ConfigError::MissingRequired {
                field: format!("services.{name}"),
            })
        })
    }

    /// Service names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Add or replace the definition called `name`.
    pub fn insert(&mut self, name: impl Into<String>, definition: ServiceDefinition) {
        self.services.insert(name.into(), definition);
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the catalog has no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn read_error(path: &Utf8Path, error: &io::Error) -> FixtainerError {
    if error.kind() == io::ErrorKind::NotFound {
        return FixtainerError::from(ConfigError::FileNotFound {
            path: path.as_std_path().to_path_buf(),
        });
    }
    FixtainerError::from(ConfigError::ParseError {
        message: format!("failed to read {path}: {error}"),
    })
}
