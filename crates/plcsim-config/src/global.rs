//! Global Configuration (~/.plcsim/config.toml)
//!
//! Handles user-level configuration stored in `~/.plcsim/config.toml`.

use crate::project::CpuSection;
use crate::specs::CpuSpecs;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.plcsim/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default CPU dimensions for every project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<CpuSection>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            let mut specs = CpuSpecs::default();
            specs.apply(defaults);
            specs.validate().map_err(|e| match e {
                ConfigError::InvalidValue { field, reason } => ConfigError::InvalidValue {
                    field: field.replacen("cpu.", "defaults.", 1),
                    reason,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.plcsim/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".plcsim").join("config.toml"))
    }
}
