//! Charm options
//!
//! The option set operators change with `juju config`. Loaded from a flat
//! YAML mapping; every option has a default.

use crate::error::{CharmError, Result};
use crate::registry::RegistrySet;
use crate::render::{GpuDriver, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Charm configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharmConfig {
    /// containerd config schema, `v1` or `v2`
    pub config_version: String,
    /// JSON array of registry credentials
    pub custom_registries: String,
    /// `auto`, `nvidia` or `none`
    pub gpu_driver: String,
    /// Default runtime, `auto` picks runc or the GPU runtime
    pub runtime: String,
    /// Shim binary of the legacy linux runtime plugin
    pub shim: String,
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
    /// Ignore the Juju model proxy settings
    pub disable_juju_proxy: bool,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            config_version: "v2".to_string(),
            custom_registries: "[]".to_string(),
            gpu_driver: "auto".to_string(),
            runtime: "auto".to_string(),
            shim: "containerd-shim".to_string(),
            http_proxy: String::new(),
            https_proxy: String::new(),
            no_proxy: String::new(),
            disable_juju_proxy: false,
        }
    }
}

impl CharmConfig {
    /// Load options from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse options from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| CharmError::Yaml(format!("Failed to parse options: {}", e)))
    }

    pub fn schema_version(&self) -> Result<SchemaVersion> {
        self.config_version.parse()
    }

    pub fn gpu_driver(&self) -> Result<GpuDriver> {
        self.gpu_driver.parse()
    }

    /// Validated `custom_registries`
    pub fn registries(&self) -> Result<RegistrySet> {
        RegistrySet::parse(&self.custom_registries).map_err(|e| match e {
            CharmError::Validation(msg) => {
                CharmError::Validation(format!("Invalid custom_registries: {}", msg))
            }
            other => other,
        })
    }

    /// Check every option that has a closed set of valid values
    pub fn validate(&self) -> Result<()> {
        self.schema_version()?;
        self.gpu_driver()?;
        self.registries()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = CharmConfig::from_yaml("").unwrap();
        assert_eq!(config, CharmConfig::default());
        assert_eq!(config.schema_version().unwrap(), SchemaVersion::V2);
        assert_eq!(config.gpu_driver().unwrap(), GpuDriver::Auto);
        assert!(config.registries().unwrap().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
config_version: v1
gpu_driver: none
custom_registries: '[{"url": "https://my.registry:5000", "username": "user", "password": "pass"}]'
"#;
        let config = CharmConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.schema_version().unwrap(), SchemaVersion::V1);
        assert_eq!(config.gpu_driver().unwrap(), GpuDriver::None);
        assert_eq!(config.runtime, "auto");
        assert_eq!(config.registries().unwrap().hosts(), vec!["my.registry:5000"]);
    }

    #[test]
    fn test_invalid_options() {
        let config = CharmConfig {
            gpu_driver: "amd".to_string(),
            ..CharmConfig::default()
        };
        assert!(config.validate().unwrap_err().is_validation());

        let config = CharmConfig {
            custom_registries: "{}".to_string(),
            ..CharmConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("Invalid custom_registries: custom_registries is not a list"));
    }

    #[test]
    fn test_bad_yaml() {
        let err = CharmConfig::from_yaml("config_version: [").unwrap_err();
        assert!(matches!(err, CharmError::Yaml(_)));
    }

    #[test]
    fn test_load_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("options.yaml");
        std::fs::write(&path, "shim: /usr/bin/containerd-shim-runc-v1\n").unwrap();
        let config = CharmConfig::load(&path).unwrap();
        assert_eq!(config.shim, "/usr/bin/containerd-shim-runc-v1");
    }
}
