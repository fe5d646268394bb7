//! YAML configuration for the command-line front end
//!
//! ```yaml
//! engine:
//!   program: zuk
//!   args: ["--rpc"]
//!   timeout_seconds: 30
//! suggestion_amount: 5
//! highlight_policy: drop
//! context:
//!   locale: en-US
//! ```
//!
//! Every field is optional. The default file lives at
//! `<config dir>/zuk-bridge/config.yaml`.

use crate::backend::SubprocessConfig;
use crate::context::Context;
use crate::facade::DEFAULT_SUGGESTION_AMOUNT;
use crate::normalize::BoundaryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No engine program configured")]
    MissingEngine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            working_dir: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub suggestion_amount: usize,
    pub highlight_policy: BoundaryPolicy,
    /// Applied over the system locale and timezone.
    pub context: Context,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            suggestion_amount: DEFAULT_SUGGESTION_AMOUNT,
            highlight_policy: BoundaryPolicy::default(),
            context: Context::default(),
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/zuk-bridge/config.yaml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("zuk-bridge").join("config.yaml"))
    }

    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicit file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Self::from_yaml(&text, path)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// How to launch the configured engine program.
    pub fn subprocess(&self) -> Result<SubprocessConfig, ConfigError> {
        if self.engine.program.trim().is_empty() {
            return Err(ConfigError::MissingEngine);
        }
        let mut config = SubprocessConfig::new(self.engine.program.clone())
            .with_args(self.engine.args.clone())
            .with_timeout(Duration::from_secs(self.engine.timeout_seconds));
        if let Some(dir) = &self.engine.working_dir {
            config = config.with_working_dir(dir.clone());
        }
        Ok(config)
    }
}
