//! Project Configuration (plcsim.toml)
//!
//! Handles project-level configuration stored in `plcsim.toml` at the project root.

use crate::specs::CpuSpecs;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Project configuration from plcsim.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectInfo>,

    /// CPU dimensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSection>,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,
}

/// Partial CPU dimensions, as written in a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CpuSection {
    /// Local (scratch) stack size per frame, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_bytes: Option<u32>,

    /// Maximum call nesting depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,

    /// Flag area size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_bytes: Option<u32>,

    /// Input area size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_bytes: Option<u32>,

    /// Output area size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u32>,

    /// Number of timers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timers: Option<u32>,

    /// Number of counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<u32>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    ///
    /// The `[cpu]` section is checked in isolation against the defaults, so a
    /// file that is invalid on its own is rejected at load time.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "project.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        if let Some(cpu) = &self.cpu {
            let mut specs = CpuSpecs::default();
            specs.apply(cpu);
            specs.validate()?;
        }

        Ok(())
    }

    /// Get the project name, if present
    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// Mutable access to the `[cpu]` section, creating it if absent
    pub fn cpu_mut(&mut self) -> &mut CpuSection {
        self.cpu.get_or_insert_with(CpuSection::default)
    }
}
