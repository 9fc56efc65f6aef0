//! Instrumentation configuration.

use crate::error::{InstrError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Probe count assumed for interface modules, whose array is requested
/// before the real count is known.
pub const DEFAULT_INTERFACE_PROBE_COUNT: usize = 64;

/// Default owner of the registry entry point.
pub const DEFAULT_REGISTRY_CLASS: &str = "covprobe/rt/Registry";

/// Default registry entry point name.
pub const DEFAULT_REGISTRY_METHOD: &str = "getProbes";

/// Where injected code obtains probe arrays at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Internal name of the class holding the static entry point
    pub registry_class: String,
    /// Name of the static `(JLjava/lang/String;I)[Z` entry point
    pub method_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            registry_class: DEFAULT_REGISTRY_CLASS.to_string(),
            method_name: DEFAULT_REGISTRY_METHOD.to_string(),
        }
    }
}

/// Instrumentation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Placeholder probe count for interface modules
    pub interface_probe_count: usize,
    /// Runtime registry binding
    pub runtime: RuntimeConfig,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            interface_probe_count: DEFAULT_INTERFACE_PROBE_COUNT,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl InstrumentConfig {
    /// Create a builder for instrumentation config
    #[must_use]
    pub fn builder() -> InstrumentConfigBuilder {
        InstrumentConfigBuilder::default()
    }

    /// Parse and validate a YAML document. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| InstrError::Config(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| InstrError::Config(format!("Failed to serialize configuration: {e}")))
    }

    /// Reject configurations that cannot produce loadable code.
    pub fn validate(&self) -> Result<()> {
        if self.interface_probe_count == 0 {
            return Err(InstrError::Config(
                "interface_probe_count must be positive".to_string(),
            ));
        }
        if self.runtime.registry_class.is_empty() {
            return Err(InstrError::Config(
                "runtime.registry_class must not be empty".to_string(),
            ));
        }
        if self.runtime.method_name.is_empty() {
            return Err(InstrError::Config(
                "runtime.method_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for instrumentation configuration
#[derive(Debug, Default)]
pub struct InstrumentConfigBuilder {
    interface_probe_count: usize,
    registry_class: Option<String>,
    method_name: Option<String>,
}

impl InstrumentConfigBuilder {
    /// Set the interface placeholder probe count; 0 keeps the default
    #[must_use]
    pub fn interface_probe_count(mut self, count: usize) -> Self {
        self.interface_probe_count = count;
        self
    }

    /// Set the registry class
    #[must_use]
    pub fn registry_class(mut self, class: impl Into<String>) -> Self {
        self.registry_class = Some(class.into());
        self
    }

    /// Set the registry method name
    #[must_use]
    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method_name = Some(name.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<InstrumentConfig> {
        let defaults = RuntimeConfig::default();
        let config = InstrumentConfig {
            interface_probe_count: if self.interface_probe_count == 0 {
                DEFAULT_INTERFACE_PROBE_COUNT
            } else {
                self.interface_probe_count
            },
            runtime: RuntimeConfig {
                registry_class: self.registry_class.unwrap_or(defaults.registry_class),
                method_name: self.method_name.unwrap_or(defaults.method_name),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
