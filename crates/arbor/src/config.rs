//! # Runtime Configuration
//!
//! One TOML file, loaded once at startup:
//!
//! ```toml
//! scenes = ["Game", "Hud"]
//!
//! [world]
//! publish_hook_failures = true
//!
//! [driver]
//! frame_budget_ms = 16
//!
//! [logging]
//! level = "arbor=debug,info"
//! ```
//!
//! Missing keys take their defaults; unknown keys are rejected.

use std::path::{Path, PathBuf};

use arbor_core::{DriverConfig, SceneType, WorldConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`RuntimeConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            ansi: true,
        }
    }
}

/// Top-level configuration of a [`Runtime`](crate::Runtime).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Scenes created at startup, in order.
    pub scenes: Vec<SceneType>,
    /// World settings.
    pub world: WorldConfig,
    /// Lifecycle driver settings.
    pub driver: DriverConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the string is not valid.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
