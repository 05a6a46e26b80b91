//! plcsim Configuration System
//!
//! Provides the CPU specification used by the call-frame engine and the
//! layered configuration files it is loaded from:
//! - Project configuration (plcsim.toml)
//! - Global user configuration (~/.plcsim/config.toml)
//! - Environment variable overrides (PLCSIM_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is merged in the following order (later overrides earlier):
//! 1. Built-in defaults ([`CpuSpecs::default`])
//! 2. Global config (~/.plcsim/config.toml, `[defaults]` section)
//! 3. Project config (./plcsim.toml, `[cpu]` section)
//! 4. Environment variables (PLCSIM_LOCAL_BYTES, PLCSIM_MAX_CALL_DEPTH)
//!
//! # Example
//!
//! ```no_run
//! use plcsim_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let specs = config.cpu_specs().unwrap();
//! assert!(specs.local_bytes > 0);
//! ```

pub mod global;
pub mod loader;
pub mod project;
pub mod specs;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{CpuSection, ProjectConfig};
pub use specs::CpuSpecs;
