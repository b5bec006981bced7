//! Translation of a service's container requirements into Bollard payloads.

use std::collections::{BTreeMap, HashMap};

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};
use serde_json::{Map, Value};

use crate::error::{ConfigError, FixtainerError};

/// Label attached to every container created by fixtainer.
pub const MANAGED_LABEL: &str = "fixtainer.managed";

/// Everything needed to create one service container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    image: String,
    name: String,
    ports: BTreeMap<u16, u16>,
    run_settings: Map<String, Value>,
}

impl ContainerSpec {
    /// Describe a container named `name` running `image`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when either value is blank.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Result<Self, FixtainerError> {
        let image_value = require("image", image.into())?;
        let name_value = require("name", name.into())?;
        Ok(Self {
            image: image_value,
            name: name_value,
            ports: BTreeMap::new(),
            run_settings: Map::new(),
        })
    }

    /// Publish each container port on the paired host port.
    #[must_use]
    pub fn with_ports(mut self, ports: &BTreeMap<u16, u16>) -> Self {
        self.ports.clone_from(ports);
        self
    }

    /// Extra create settings in Docker API form (for example `Env` or
    /// `HostConfig`), deep-merged over the generated body.
    #[must_use]
    pub fn with_run_settings(mut self, settings: &Map<String, Value>) -> Self {
        self.run_settings.clone_from(settings);
        self
    }

    /// The container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The image reference or ID the container is created from.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    pub(crate) fn create_options(&self) -> CreateContainerOptions {
        CreateContainerOptionsBuilder::new().name(&self.name).build()
    }

    /// Build the create payload.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the run settings cannot be
    /// merged into a valid create body.
    pub(crate) fn create_body(&self) -> Result<ContainerCreateBody, FixtainerError> {
        let body = ContainerCreateBody {
            image: Some(self.image.clone()),
            labels: Some(HashMap::from([(
                String::from(MANAGED_LABEL),
                String::from("true"),
            )])),
            exposed_ports: Some(self.ports.keys().map(|port| format!("{port}/tcp")).collect()),
            host_config: Some(HostConfig {
                port_bindings: Some(self.port_bindings()),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        if self.run_settings.is_empty() {
            return Ok(body);
        }

        let mut merged = serde_json::to_value(&body).map_err(|error| invalid_run_settings(&error))?;
        merge_json(&mut merged, Value::Object(self.run_settings.clone()));
        serde_json::from_value(merged).map_err(|error| invalid_run_settings(&error))
    }

    fn port_bindings(&self) -> HashMap<String, Option<Vec<PortBinding>>> {
        self.ports
            .iter()
            .map(|(container_port, host_port)| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                };
                (format!("{container_port}/tcp"), Some(vec![binding]))
            })
            .collect()
    }
}

fn require(field: &str, value: String) -> Result<String, FixtainerError> {
    if value.trim().is_empty() {
        return Err(FixtainerError::from(ConfigError::MissingRequired {
            field: String::from(field),
        }));
    }
    Ok(value)
}

fn invalid_run_settings(error: &serde_json::Error) -> FixtainerError {
    FixtainerError::from(ConfigError::InvalidValue {
        field: String::from("additional_run_settings"),
        reason: error.to_string(),
    })
}

/// Objects merge key by key; any other value in `overlay` replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
